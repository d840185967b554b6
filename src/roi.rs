use serde::{Deserialize, Serialize};

/// Role a region plays in the inspection layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoiRole {
    MasterPattern,
    MasterSearch,
    Inspection,
}

/// Shape-specific geometry. Radii and side lengths are in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "shape", rename_all = "snake_case")]
pub enum RoiShape {
    Rect { width: f64, height: f64 },
    Circle { radius: f64 },
    Annulus { radius: f64, inner_radius: f64 },
}

/// A region of interest in full-image coordinates.
///
/// The center/angle representation is shared by all shapes; the shape variant
/// carries the remaining geometry. Regions are created and edited by the
/// caller; the matching core treats them as read-only except where an
/// alignment update is explicitly requested.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Roi {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    pub role: RoiRole,
    pub cx: f64,
    pub cy: f64,
    #[serde(default)]
    pub angle_deg: f64,
    #[serde(flatten)]
    pub shape: RoiShape,
}

/// Axis-aligned pixel rectangle resolved from a region, clamped to an image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl PixelRect {
    pub fn right(&self) -> u32 {
        self.x + self.width
    }

    pub fn bottom(&self) -> u32 {
        self.y + self.height
    }

    /// Whether `other` lies fully inside this rectangle.
    pub fn contains(&self, other: &PixelRect) -> bool {
        other.x >= self.x
            && other.y >= self.y
            && other.right() <= self.right()
            && other.bottom() <= self.bottom()
    }
}

impl Roi {
    pub fn rect(id: impl Into<String>, role: RoiRole, cx: f64, cy: f64, width: f64, height: f64) -> Self {
        Self {
            id: id.into(),
            label: None,
            role,
            cx,
            cy,
            angle_deg: 0.0,
            shape: RoiShape::Rect { width, height },
        }
    }

    pub fn circle(id: impl Into<String>, role: RoiRole, cx: f64, cy: f64, radius: f64) -> Self {
        Self {
            id: id.into(),
            label: None,
            role,
            cx,
            cy,
            angle_deg: 0.0,
            shape: RoiShape::Circle { radius },
        }
    }

    pub fn annulus(
        id: impl Into<String>,
        role: RoiRole,
        cx: f64,
        cy: f64,
        radius: f64,
        inner_radius: f64,
    ) -> Self {
        Self {
            id: id.into(),
            label: None,
            role,
            cx,
            cy,
            angle_deg: 0.0,
            shape: RoiShape::Annulus { radius, inner_radius },
        }
    }

    pub fn center(&self) -> (f64, f64) {
        (self.cx, self.cy)
    }

    /// Name used in diagnostics: the label when set, the id otherwise.
    pub fn display_name(&self) -> &str {
        self.label.as_deref().unwrap_or(&self.id)
    }

    /// Unclamped bounding extents (left, top, right, bottom).
    ///
    /// Rectangles use their width/height; circles and annuli resolve to the
    /// bounding square of the outer radius. The region's own rotation is
    /// ignored here: the axis-aligned box is what the matchers crop.
    pub fn extents(&self) -> (f64, f64, f64, f64) {
        match self.shape {
            RoiShape::Rect { width, height } => (
                self.cx - width * 0.5,
                self.cy - height * 0.5,
                self.cx + width * 0.5,
                self.cy + height * 0.5,
            ),
            RoiShape::Circle { radius } | RoiShape::Annulus { radius, .. } => (
                self.cx - radius,
                self.cy - radius,
                self.cx + radius,
                self.cy + radius,
            ),
        }
    }

    /// Resolve the region to an integer pixel rectangle clamped to an
    /// `image_width` x `image_height` image. Minimum size 1x1.
    pub fn pixel_rect(&self, image_width: u32, image_height: u32) -> PixelRect {
        let (left, top, right, bottom) = self.extents();

        let mut x = left.floor() as i64;
        let mut y = top.floor() as i64;
        let mut w = (right - x as f64).ceil() as i64;
        let mut h = (bottom - y as f64).ceil() as i64;

        let max_x = (image_width as i64 - 1).max(0);
        let max_y = (image_height as i64 - 1).max(0);

        x = x.clamp(0, max_x);
        y = y.clamp(0, max_y);
        w = w.clamp(1, (image_width as i64 - x).max(1));
        h = h.clamp(1, (image_height as i64 - y).max(1));

        PixelRect {
            x: x as u32,
            y: y as u32,
            width: w as u32,
            height: h as u32,
        }
    }

    /// Check the shape invariants: positive sizes, annulus inner < outer.
    pub fn validate(&self) -> crate::Result<()> {
        match self.shape {
            RoiShape::Rect { width, height } => {
                anyhow::ensure!(width > 0.0 && height > 0.0, "roi {}: non-positive rectangle size", self.id);
            }
            RoiShape::Circle { radius } => {
                anyhow::ensure!(radius > 0.0, "roi {}: non-positive radius", self.id);
            }
            RoiShape::Annulus { radius, inner_radius } => {
                anyhow::ensure!(radius > 0.0, "roi {}: non-positive radius", self.id);
                anyhow::ensure!(
                    inner_radius < radius,
                    "roi {}: inner radius {} must be below outer radius {}",
                    self.id,
                    inner_radius,
                    radius
                );
            }
        }
        Ok(())
    }
}
