//! Screen geometry and tray-anchored window placement.

/// A point in global screen coordinates.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

impl Point {
    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Size {
    pub width: u32,
    pub height: u32,
}

impl Size {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl Rect {
    pub fn new(x: i32, y: i32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn origin(&self) -> Point {
        Point::new(self.x, self.y)
    }

    pub fn size(&self) -> Size {
        Size::new(self.width, self.height)
    }

    pub fn right(&self) -> i32 {
        self.x + self.width as i32
    }

    pub fn bottom(&self) -> i32 {
        self.y + self.height as i32
    }

    /// Edges are inclusive: a pointer on the border counts as inside.
    pub fn contains(&self, p: Point) -> bool {
        p.x >= self.x && p.x <= self.right() && p.y >= self.y && p.y <= self.bottom()
    }

    fn center(&self) -> Point {
        Point::new(
            self.x + (self.width / 2) as i32,
            self.y + (self.height / 2) as i32,
        )
    }
}

/// A monitor: its full bounds and the part not covered by bars and docks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Display {
    pub bounds: Rect,
    pub work_area: Rect,
}

impl Display {
    /// A display with nothing reserved.
    pub fn bare(bounds: Rect) -> Self {
        Self {
            bounds,
            work_area: bounds,
        }
    }
}

/// Screen edge occupied by the taskbar or menu bar.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskbarEdge {
    Top,
    Bottom,
    Left,
    Right,
}

/// Infers the taskbar edge from how the work area is inset.
///
/// A display with no inset is treated as having a bottom taskbar.
pub fn taskbar_edge(display: &Display) -> TaskbarEdge {
    let (bounds, work) = (display.bounds, display.work_area);
    if work.y > bounds.y {
        TaskbarEdge::Top
    } else if work.x > bounds.x {
        TaskbarEdge::Left
    } else if work.width == bounds.width {
        TaskbarEdge::Bottom
    } else {
        TaskbarEdge::Right
    }
}

/// Places a window of `window` size next to the tray icon.
///
/// Horizontal taskbars center the window on the icon and put it against
/// the bar; vertical ones center it vertically. The result is clamped to
/// the work area so the window never hangs off the display.
pub fn position_near_tray(window: Size, tray: Rect, display: &Display) -> Point {
    let work = display.work_area;
    let (w, h) = (window.width as i32, window.height as i32);
    let anchor = tray.center();

    let (x, y) = match taskbar_edge(display) {
        TaskbarEdge::Top => (anchor.x - w / 2, work.y),
        TaskbarEdge::Bottom => (anchor.x - w / 2, work.bottom() - h),
        TaskbarEdge::Left => (work.x, anchor.y - h / 2),
        TaskbarEdge::Right => (work.right() - w, anchor.y - h / 2),
    };

    Point::new(
        x.min(work.right() - w).max(work.x),
        y.min(work.bottom() - h).max(work.y),
    )
}
