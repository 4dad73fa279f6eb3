use imageproc::point::Point;
use serde::{Deserialize, Serialize};

/// Axis-aligned box in frame pixel coordinates.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl BoundingBox {
    pub const fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Smallest box covering every point, or `None` for an empty slice.
    pub fn enclosing(points: &[Point<i32>]) -> Option<Self> {
        let first = points.first()?;
        let (mut min_x, mut min_y, mut max_x, mut max_y) = (first.x, first.y, first.x, first.y);
        for p in &points[1..] {
            min_x = min_x.min(p.x);
            min_y = min_y.min(p.y);
            max_x = max_x.max(p.x);
            max_y = max_y.max(p.y);
        }
        Some(Self::new(min_x, min_y, max_x - min_x + 1, max_y - min_y + 1))
    }

    pub fn right(&self) -> i32 {
        self.x + self.width
    }

    pub fn bottom(&self) -> i32 {
        self.y + self.height
    }

    pub fn area(&self) -> i64 {
        i64::from(self.width) * i64::from(self.height)
    }

    /// Integer centre, `origin + size / 2`.
    pub fn center(&self) -> (i32, i32) {
        (self.x + self.width / 2, self.y + self.height / 2)
    }

    /// Intersection-over-union. Boxes that do not overlap score 0.
    pub fn iou(&self, other: &BoundingBox) -> f64 {
        let x_left = self.x.max(other.x);
        let y_top = self.y.max(other.y);
        let x_right = self.right().min(other.right());
        let y_bottom = self.bottom().min(other.bottom());

        if x_right < x_left || y_bottom < y_top {
            return 0.0;
        }

        let intersection = i64::from(x_right - x_left) * i64::from(y_bottom - y_top);
        let union = self.area() + other.area() - intersection;
        if union <= 0 {
            return 0.0;
        }
        intersection as f64 / union as f64
    }

    pub fn union(&self, other: &BoundingBox) -> BoundingBox {
        let x = self.x.min(other.x);
        let y = self.y.min(other.y);
        let right = self.right().max(other.right());
        let bottom = self.bottom().max(other.bottom());
        BoundingBox::new(x, y, right - x, bottom - y)
    }

    /// Map a box found on a resampled frame back to the original resolution.
    pub fn unscale(&self, scale: f64) -> BoundingBox {
        let map = |v: i32| (f64::from(v) / scale).round() as i32;
        BoundingBox::new(
            map(self.x),
            map(self.y),
            map(self.width).max(1),
            map(self.height).max(1),
        )
    }

    /// True when the box lies entirely inside a `width` x `height` frame.
    pub fn fits_within(&self, width: u32, height: u32) -> bool {
        self.x >= 0
            && self.y >= 0
            && self.width > 0
            && self.height > 0
            && i64::from(self.right()) <= i64::from(width)
            && i64::from(self.bottom()) <= i64::from(height)
    }
}

/// Coarse object category.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Small,
    Medium,
    Large,
    Bird,
    Unknown,
}

impl Category {
    pub const ALL: [Category; 5] = [
        Category::Small,
        Category::Medium,
        Category::Large,
        Category::Bird,
        Category::Unknown,
    ];

    pub fn label(self) -> &'static str {
        match self {
            Category::Small => "small",
            Category::Medium => "medium",
            Category::Large => "large",
            Category::Bird => "bird",
            Category::Unknown => "unknown",
        }
    }
}

/// One detected object on one frame.
///
/// `id` is 0 until the detector shell assigns a tracking id.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Detection {
    pub bbox: BoundingBox,
    pub center: (i32, i32),
    pub area: f64,
    #[serde(skip)]
    pub contour: Option<Vec<Point<i32>>>,
    pub category: Category,
    pub confidence: f64,
    pub velocity: f64,
    /// Degrees.
    pub direction: f64,
    pub id: u64,
}

impl Detection {
    pub fn new(bbox: BoundingBox, area: f64, category: Category, confidence: f64) -> Self {
        Self {
            bbox,
            center: bbox.center(),
            area,
            contour: None,
            category,
            confidence,
            velocity: 0.0,
            direction: 0.0,
            id: 0,
        }
    }

    pub fn with_contour(mut self, contour: Vec<Point<i32>>) -> Self {
        self.contour = Some(contour);
        self
    }

    /// Replace the box and keep the centre consistent with it.
    pub fn set_bbox(&mut self, bbox: BoundingBox) {
        self.bbox = bbox;
        self.center = bbox.center();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn iou_of_disjoint_boxes_is_zero() {
        let a = BoundingBox::new(0, 0, 10, 10);
        let b = BoundingBox::new(50, 50, 10, 10);
        assert_eq!(a.iou(&b), 0.0);
    }

    #[test]
    fn iou_of_identical_boxes_is_one() {
        let a = BoundingBox::new(3, 4, 20, 10);
        assert!((a.iou(&a) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn iou_of_half_overlap() {
        let a = BoundingBox::new(0, 0, 10, 10);
        let b = BoundingBox::new(5, 0, 10, 10);
        // 50 / 150
        assert!((a.iou(&b) - 1.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn union_and_center() {
        let a = BoundingBox::new(0, 0, 10, 10);
        let b = BoundingBox::new(5, 5, 10, 10);
        let u = a.union(&b);
        assert_eq!(u, BoundingBox::new(0, 0, 15, 15));
        assert_eq!(u.center(), (7, 7));
    }

    #[test]
    fn enclosing_points() {
        let pts = [Point::new(4, 9), Point::new(10, 2), Point::new(7, 5)];
        assert_eq!(BoundingBox::enclosing(&pts), Some(BoundingBox::new(4, 2, 7, 8)));
        assert_eq!(BoundingBox::enclosing(&[]), None);
    }

    #[test]
    fn unscale_round_trips_at_half() {
        let original = BoundingBox::new(81, 61, 40, 40);
        let scaled = BoundingBox::new(40, 30, 20, 20);
        let back = scaled.unscale(0.5);
        assert!((back.x - original.x).abs() <= 1);
        assert!((back.y - original.y).abs() <= 1);
        assert!((back.width - original.width).abs() <= 1);
        assert!((back.height - original.height).abs() <= 1);
    }

    #[test]
    fn set_bbox_keeps_center_consistent() {
        let mut d = Detection::new(BoundingBox::new(0, 0, 4, 4), 16.0, Category::Small, 0.5);
        d.set_bbox(BoundingBox::new(10, 20, 6, 8));
        assert_eq!(d.center, (13, 24));
    }
}
