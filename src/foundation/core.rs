use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

impl Point {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

/// Half-open integer rectangle: covers `left..right` by `top..bottom`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Rect {
    pub left: i32,
    pub top: i32,
    pub right: i32,
    pub bottom: i32,
}

impl Rect {
    pub const fn new(left: i32, top: i32, right: i32, bottom: i32) -> Self {
        Self {
            left,
            top,
            right,
            bottom,
        }
    }

    pub const fn from_xywh(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self::new(x, y, x + width, y + height)
    }

    /// Rectangle anchored at the origin.
    pub const fn with_size(width: u32, height: u32) -> Self {
        Self::new(0, 0, width as i32, height as i32)
    }

    pub fn width(&self) -> i32 {
        self.right - self.left
    }

    pub fn height(&self) -> i32 {
        self.bottom - self.top
    }

    pub fn is_empty(&self) -> bool {
        self.right <= self.left || self.bottom <= self.top
    }

    /// Grows `self` to the bounding box of `self` and `other`. Empty rects are ignored.
    pub fn extend(&mut self, other: Rect) {
        if other.is_empty() {
            return;
        }
        if self.is_empty() {
            *self = other;
            return;
        }
        self.left = self.left.min(other.left);
        self.top = self.top.min(other.top);
        self.right = self.right.max(other.right);
        self.bottom = self.bottom.max(other.bottom);
    }

    pub fn intersect(&self, other: Rect) -> Rect {
        let r = Rect::new(
            self.left.max(other.left),
            self.top.max(other.top),
            self.right.min(other.right),
            self.bottom.min(other.bottom),
        );
        if r.is_empty() { Rect::default() } else { r }
    }

    pub fn contains_rect(&self, other: Rect) -> bool {
        other.left >= self.left
            && other.top >= self.top
            && other.right <= self.right
            && other.bottom <= self.bottom
    }

    pub fn contains_point(&self, p: Point) -> bool {
        p.x >= self.left && p.x < self.right && p.y >= self.top && p.y < self.bottom
    }

    pub fn translate(&self, dx: i32, dy: i32) -> Rect {
        Rect::new(
            self.left + dx,
            self.top + dy,
            self.right + dx,
            self.bottom + dy,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extend_replaces_empty_and_grows_otherwise() {
        let mut r = Rect::default();
        r.extend(Rect::new(2, 3, 4, 5));
        assert_eq!(r, Rect::new(2, 3, 4, 5));
        r.extend(Rect::new(0, 4, 3, 9));
        assert_eq!(r, Rect::new(0, 3, 4, 9));
        r.extend(Rect::default());
        assert_eq!(r, Rect::new(0, 3, 4, 9));
    }

    #[test]
    fn intersect_of_disjoint_is_empty() {
        let a = Rect::from_xywh(0, 0, 10, 10);
        assert!(a.intersect(Rect::from_xywh(20, 20, 5, 5)).is_empty());
        assert_eq!(
            a.intersect(Rect::from_xywh(5, -5, 10, 10)),
            Rect::new(5, 0, 10, 5)
        );
    }

    #[test]
    fn containment() {
        let a = Rect::with_size(320, 200);
        assert!(a.contains_rect(Rect::from_xywh(0, 0, 320, 200)));
        assert!(!a.contains_rect(Rect::from_xywh(1, 0, 320, 200)));
        assert!(a.contains_point(Point::new(319, 199)));
        assert!(!a.contains_point(Point::new(320, 0)));
    }
}
