use rayon::prelude::*;

use crate::types::{AnnotatedFiles, Annotation};

/// Geometric adjustment applied to every bounding box.
///
/// The box is first scaled about its center by `scale_x`/`scale_y`, then grown (never shrunk)
/// along one axis to reach `aspect_ratio` (width / height). An aspect ratio <= 0 disables the
/// second step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BboxTransform {
    pub scale_x: f64,
    pub scale_y: f64,
    pub aspect_ratio: f64,
}

impl Default for BboxTransform {
    fn default() -> Self {
        Self {
            scale_x: 1.0,
            scale_y: 1.0,
            aspect_ratio: 0.0,
        }
    }
}

impl BboxTransform {
    pub fn is_neutral(&self) -> bool {
        self.scale_x == 1.0 && self.scale_y == 1.0 && self.aspect_ratio <= 0.0
    }

    pub fn apply(&self, a: &mut Annotation) {
        if self.scale_x != 1.0 || self.scale_y != 1.0 {
            let w = a.width();
            let h = a.height();
            let dx = (w * self.scale_x - w) * 0.5;
            let dy = (h * self.scale_y - h) * 0.5;
            a.coords[0] -= dx;
            a.coords[1] -= dy;
            a.coords[2] += dx;
            a.coords[3] += dy;
        }

        if self.aspect_ratio > 0.0 {
            let w = a.width();
            let h = a.height();
            // A zero height always grows vertically.
            let ratio = if h != 0.0 { w / h } else { f64::MAX };

            if ratio < self.aspect_ratio {
                let dx = (h * self.aspect_ratio - w) * 0.5;
                a.coords[0] -= dx;
                a.coords[2] += dx;
            } else if ratio > self.aspect_ratio {
                let dy = (w / self.aspect_ratio - h) * 0.5;
                a.coords[1] -= dy;
                a.coords[3] += dy;
            }
        }
    }
}

/// Transform all bounding boxes in place.
pub fn transform_bboxes(data: &mut AnnotatedFiles, transform: &BboxTransform) {
    if transform.is_neutral() {
        return;
    }
    data.par_iter_mut()
        .flat_map_iter(|f| f.annotations.iter_mut())
        .for_each(|a| transform.apply(a));
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn center(a: &Annotation) -> (f64, f64) {
        (
            (a.coords[0] + a.coords[2]) / 2.0,
            (a.coords[1] + a.coords[3]) / 2.0,
        )
    }

    #[test]
    fn test_scale_keeps_center() {
        let mut a = Annotation::new("x", [10.0, 20.0, 30.0, 60.0]);
        let t = BboxTransform {
            scale_x: 2.0,
            scale_y: 0.5,
            aspect_ratio: 0.0,
        };
        t.apply(&mut a);
        assert_eq!(a.coords, [0.0, 30.0, 40.0, 50.0]);
        assert_eq!(center(&a), (20.0, 40.0));
    }

    #[test]
    fn test_aspect_ratio_grows_only() {
        let boxes = [
            [0.0, 0.0, 10.0, 40.0],
            [0.0, 0.0, 40.0, 10.0],
            [5.0, 5.0, 25.0, 15.0],
            [3.0, 7.0, 9.0, 7.0],
            [1.0, 1.0, 3.0, 1.5],
        ];
        for ratio in [0.5, 1.0, 1.7, 4.0] {
            let t = BboxTransform {
                aspect_ratio: ratio,
                ..Default::default()
            };
            for coords in boxes {
                let mut a = Annotation::new("x", coords);
                let (w0, h0) = (a.width(), a.height());
                let c0 = center(&a);
                t.apply(&mut a);
                assert!(a.width() >= w0 && a.height() >= h0);
                assert_relative_eq!(a.width() / a.height(), ratio, epsilon = 1e-9);
                let c1 = center(&a);
                assert_relative_eq!(c0.0, c1.0, epsilon = 1e-9);
                assert_relative_eq!(c0.1, c1.1, epsilon = 1e-9);
            }
        }
    }

    #[test]
    fn test_neutral_transform_is_noop() {
        let mut data: AnnotatedFiles = vec![crate::types::AnnotatedFile::new(
            "a.jpg",
            vec![Annotation::new("x", [1.0, 2.0, 3.0, 4.0])],
        )]
        .into();
        let before = data.clone();
        transform_bboxes(&mut data, &BboxTransform::default());
        assert_eq!(data, before);
    }
}
