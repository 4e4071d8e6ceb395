use crate::sensors::{BoundingBox, RawDetection};

/// Intersection over union of two regions, 0.0 for disjoint or degenerate boxes.
pub fn iou(a: &BoundingBox, b: &BoundingBox) -> f32 {
    let inter = BoundingBox::new(a.x1.max(b.x1), a.y1.max(b.y1), a.x2.min(b.x2), a.y2.min(b.y2));
    let inter_area = inter.area();
    let union = a.area() + b.area() - inter_area;
    if union <= 0.0 {
        return 0.0;
    }
    inter_area / union
}

/// Greedy per-class non-max suppression: within one label, a detection whose
/// IoU with an already kept, higher-confidence detection is `>= threshold` is
/// discarded.
pub fn non_max_suppression(mut detections: Vec<RawDetection>, threshold: f32) -> Vec<RawDetection> {
    detections.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

    let mut kept: Vec<RawDetection> = Vec::with_capacity(detections.len());
    for candidate in detections {
        let overlaps = kept
            .iter()
            .filter(|k| k.label.eq_ignore_ascii_case(&candidate.label))
            .any(|k| iou(&k.region, &candidate.region) >= threshold);
        if !overlaps {
            kept.push(candidate);
        }
    }
    kept
}

#[cfg(test)]
mod tests {
    use super::*;

    fn det(label: &str, confidence: f32, x1: f32, y1: f32, x2: f32, y2: f32) -> RawDetection {
        RawDetection::new(label, confidence, BoundingBox::new(x1, y1, x2, y2))
    }

    #[test]
    fn iou_of_identical_boxes_is_one() {
        let b = BoundingBox::new(0.0, 0.0, 10.0, 10.0);
        assert!((iou(&b, &b) - 1.0).abs() < f32::EPSILON);
    }

    #[test]
    fn iou_of_disjoint_boxes_is_zero() {
        let a = BoundingBox::new(0.0, 0.0, 10.0, 10.0);
        let b = BoundingBox::new(20.0, 20.0, 30.0, 30.0);
        assert_eq!(iou(&a, &b), 0.0);
    }

    #[test]
    fn suppresses_overlapping_same_class_only() {
        let out = non_max_suppression(
            vec![
                det("person", 0.6, 1.0, 1.0, 11.0, 11.0),
                det("person", 0.9, 0.0, 0.0, 10.0, 10.0),
                det("car", 0.7, 0.0, 0.0, 10.0, 10.0),
                det("person", 0.8, 50.0, 50.0, 60.0, 60.0),
            ],
            0.4,
        );
        let summary: Vec<(&str, f32)> = out.iter().map(|d| (d.label.as_str(), d.confidence)).collect();
        assert_eq!(summary, vec![("person", 0.9), ("person", 0.8), ("car", 0.7)]);
    }
}
