use crate::detect::result::Detection;

/// Greedy IoU merge.
///
/// Detections are visited in descending confidence. Each unclaimed detection
/// seeds a cluster and absorbs every later unclaimed detection whose IoU with
/// the seed reaches `threshold`. A cluster keeps the seed's contour, takes the
/// union box, and ends with its pairwise-averaged confidence divided by the
/// cluster size.
pub fn merge_detections(mut detections: Vec<Detection>, threshold: f64) -> Vec<Detection> {
    if detections.len() < 2 {
        return detections;
    }
    detections.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

    let mut claimed = vec![false; detections.len()];
    let mut merged = Vec::new();

    for i in 0..detections.len() {
        if claimed[i] {
            continue;
        }
        claimed[i] = true;
        let seed = &detections[i];
        let mut cluster = seed.clone();
        let mut count = 1u32;

        for j in (i + 1)..detections.len() {
            if claimed[j] {
                continue;
            }
            if seed.bbox.iou(&detections[j].bbox) >= threshold {
                cluster = combine(&cluster, &detections[j]);
                claimed[j] = true;
                count += 1;
            }
        }

        cluster.confidence /= f64::from(count);
        merged.push(cluster);
    }
    merged
}

fn combine(a: &Detection, b: &Detection) -> Detection {
    let bbox = a.bbox.union(&b.bbox);
    let category = if a.bbox.area() >= b.bbox.area() {
        a.category
    } else {
        b.category
    };
    let mut out = Detection::new(
        bbox,
        bbox.area() as f64,
        category,
        (a.confidence + b.confidence) / 2.0,
    );
    out.contour = a.contour.clone();
    out
}
