//! Pointer and keyboard gestures on top of [`OverlayStore`].
//!
//! Drag and resize write through to the store on every pointer move. There
//! is no commit step: a gesture that is cut short leaves the annotation where
//! the last move put it.

use crate::overlay::{AnnotationId, OverlayStore, Point, Size};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResizeHandle {
    North,
    South,
    East,
    West,
    NorthEast,
    NorthWest,
    SouthEast,
    SouthWest,
}

impl ResizeHandle {
    fn moves_west_edge(self) -> bool {
        matches!(self, Self::West | Self::NorthWest | Self::SouthWest)
    }

    fn moves_east_edge(self) -> bool {
        matches!(self, Self::East | Self::NorthEast | Self::SouthEast)
    }

    fn moves_north_edge(self) -> bool {
        matches!(self, Self::North | Self::NorthEast | Self::NorthWest)
    }

    fn moves_south_edge(self) -> bool {
        matches!(self, Self::South | Self::SouthEast | Self::SouthWest)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Gesture {
    Idle,
    Dragging {
        id: AnnotationId,
        /// Pointer offset from the annotation origin at press time.
        grab: Point,
    },
    Resizing {
        id: AnnotationId,
        handle: ResizeHandle,
        start: Point,
        frame: FrameSnapshot,
    },
}

/// Geometry of an annotation when a resize began.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameSnapshot {
    pub origin: Point,
    pub size: Size,
}

#[derive(Debug, Clone)]
pub struct OverlayController {
    gesture: Gesture,
    handle_size: f32,
    editing: bool,
}

impl Default for OverlayController {
    fn default() -> Self {
        Self::new(Self::DEFAULT_HANDLE_SIZE)
    }
}

impl OverlayController {
    pub const DEFAULT_HANDLE_SIZE: f32 = 8.0;

    pub fn new(handle_size: f32) -> Self {
        Self {
            gesture: Gesture::Idle,
            handle_size: handle_size.max(1.0),
            editing: false,
        }
    }

    pub fn gesture(&self) -> Gesture {
        self.gesture
    }

    pub fn is_editing(&self) -> bool {
        self.editing
    }

    /// Width of the grab zone around an edge, in overlay pixels. The tty
    /// front-end sets it to one terminal cell.
    pub fn set_handle_size(&mut self, handle_size: f32) {
        self.handle_size = handle_size.max(1.0);
    }

    /// Starts a gesture. Returns `true` when the store changed.
    pub fn pointer_down(&mut self, store: &mut OverlayStore, at: Point) -> bool {
        self.gesture = Gesture::Idle;

        if let Some(active) = store.active() {
            if let Some(handle) = self.handle_at(active.position, active.size, at) {
                tracing::debug!(id = %active.id, ?handle, "resize started");
                self.gesture = Gesture::Resizing {
                    id: active.id,
                    handle,
                    start: at,
                    frame: FrameSnapshot {
                        origin: active.position,
                        size: active.size,
                    },
                };
                return false;
            }
        }

        match store.hit_test(at) {
            Some(id) => {
                let changed = store.active_id() != Some(id);
                if changed {
                    self.editing = false;
                }
                store.activate(id);
                let origin = store.get(id).map(|a| a.position).unwrap_or_default();
                self.gesture = Gesture::Dragging {
                    id,
                    grab: Point::new(at.x - origin.x, at.y - origin.y),
                };
                tracing::debug!(%id, "drag started");
                changed
            }
            None => self.release_focus(store),
        }
    }

    pub fn pointer_move(&mut self, store: &mut OverlayStore, at: Point) -> bool {
        match self.gesture {
            Gesture::Idle => false,
            Gesture::Dragging { id, grab } => {
                store.update_position(id, at.x - grab.x, at.y - grab.y)
            }
            Gesture::Resizing {
                id,
                handle,
                start,
                frame,
            } => {
                let (origin, size) =
                    resize_frame(frame, handle, start, at, store.min_size(), store.bounds());
                store.update_size(id, size.width, size.height, origin.x, origin.y)
            }
        }
    }

    pub fn pointer_up(&mut self, store: &mut OverlayStore, at: Point) -> bool {
        let changed = self.pointer_move(store, at);
        self.gesture = Gesture::Idle;
        changed
    }

    /// Pointer capture was lost mid-gesture; the annotation keeps whatever
    /// geometry it last received.
    pub fn cancel(&mut self) {
        self.gesture = Gesture::Idle;
    }

    /// Focus leaves the active annotation.
    pub fn release_focus(&mut self, store: &mut OverlayStore) -> bool {
        self.editing = false;
        self.gesture = Gesture::Idle;
        match store.active_id() {
            Some(id) => store.deactivate(id),
            None => false,
        }
    }

    /// Enters text editing for the active annotation, if any.
    pub fn begin_editing(&mut self, store: &OverlayStore) -> bool {
        self.editing = store.active_id().is_some();
        self.editing
    }

    pub fn end_editing(&mut self) {
        self.editing = false;
    }

    pub fn insert_text(&mut self, store: &mut OverlayStore, input: &str) -> bool {
        let Some((id, mut text)) = store.active().map(|a| (a.id, a.text.clone())) else {
            return false;
        };
        if input.is_empty() {
            return false;
        }
        text.push_str(input);
        store.update_text(id, text)
    }

    pub fn backspace(&mut self, store: &mut OverlayStore) -> bool {
        let Some((id, mut text)) = store.active().map(|a| (a.id, a.text.clone())) else {
            return false;
        };
        if text.pop().is_none() {
            return false;
        }
        store.update_text(id, text)
    }

    pub fn set_text(&mut self, store: &mut OverlayStore, text: &str) -> bool {
        match store.active_id() {
            Some(id) => store.update_text(id, text),
            None => false,
        }
    }

    /// Moves the active annotation by a fixed offset.
    pub fn nudge(&mut self, store: &mut OverlayStore, dx: f32, dy: f32) -> bool {
        let Some((id, origin)) = store.active().map(|a| (a.id, a.position)) else {
            return false;
        };
        store.update_position(id, origin.x + dx, origin.y + dy)
    }

    /// Removes the active annotation.
    pub fn remove_active(&mut self, store: &mut OverlayStore) -> bool {
        let Some(id) = store.active_id() else {
            return false;
        };
        if matches!(self.gesture, Gesture::Dragging { id: g, .. } | Gesture::Resizing { id: g, .. } if g == id)
        {
            self.gesture = Gesture::Idle;
        }
        self.editing = false;
        store.remove(id)
    }

    pub fn reset(&mut self) {
        self.gesture = Gesture::Idle;
        self.editing = false;
    }

    fn handle_at(&self, origin: Point, size: Size, at: Point) -> Option<ResizeHandle> {
        let reach = self.handle_size / 2.0;
        let left = origin.x;
        let right = origin.x + size.width;
        let top = origin.y;
        let bottom = origin.y + size.height;

        if at.x < left - reach || at.x > right + reach || at.y < top - reach || at.y > bottom + reach
        {
            return None;
        }

        let near_left = (at.x - left).abs() <= reach;
        let near_right = (at.x - right).abs() <= reach;
        let near_top = (at.y - top).abs() <= reach;
        let near_bottom = (at.y - bottom).abs() <= reach;

        match (near_left, near_right, near_top, near_bottom) {
            (true, _, true, _) => Some(ResizeHandle::NorthWest),
            (_, true, true, _) => Some(ResizeHandle::NorthEast),
            (true, _, _, true) => Some(ResizeHandle::SouthWest),
            (_, true, _, true) => Some(ResizeHandle::SouthEast),
            (true, _, _, _) => Some(ResizeHandle::West),
            (_, true, _, _) => Some(ResizeHandle::East),
            (_, _, true, _) => Some(ResizeHandle::North),
            (_, _, _, true) => Some(ResizeHandle::South),
            _ => None,
        }
    }
}

/// New origin and size for a resize, keeping the edge opposite `handle`
/// fixed even when the minimum size or the page edge is reached.
fn resize_frame(
    frame: FrameSnapshot,
    handle: ResizeHandle,
    start: Point,
    at: Point,
    min: Size,
    bounds: Option<Size>,
) -> (Point, Size) {
    let dx = at.x - start.x;
    let dy = at.y - start.y;
    let right = frame.origin.x + frame.size.width;
    let bottom = frame.origin.y + frame.size.height;
    let mut origin = frame.origin;
    let mut size = frame.size;

    if handle.moves_east_edge() {
        let mut edge = right + dx;
        if let Some(bounds) = bounds {
            edge = edge.min(bounds.width);
        }
        size.width = (edge - frame.origin.x).max(min.width);
    }
    if handle.moves_west_edge() {
        let mut edge = frame.origin.x + dx;
        if bounds.is_some() {
            edge = edge.max(0.0);
        }
        size.width = (right - edge).max(min.width);
        origin.x = right - size.width;
    }
    if handle.moves_south_edge() {
        let mut edge = bottom + dy;
        if let Some(bounds) = bounds {
            edge = edge.min(bounds.height);
        }
        size.height = (edge - frame.origin.y).max(min.height);
    }
    if handle.moves_north_edge() {
        let mut edge = frame.origin.y + dy;
        if bounds.is_some() {
            edge = edge.max(0.0);
        }
        size.height = (bottom - edge).max(min.height);
        origin.y = bottom - size.height;
    }

    (origin, size)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::OverlayConfig;

    fn setup() -> (OverlayController, OverlayStore, AnnotationId) {
        let mut store = OverlayStore::new(OverlayConfig::default());
        let id = store.create();
        (OverlayController::new(8.0), store, id)
    }

    #[test]
    fn drag_moves_continuously_and_keeps_grab_offset() {
        let (mut controller, mut store, id) = setup();
        controller.pointer_down(&mut store, Point::new(60.0, 60.0));
        assert!(matches!(controller.gesture(), Gesture::Dragging { .. }));

        controller.pointer_move(&mut store, Point::new(70.0, 65.0));
        assert_eq!(store.get(id).unwrap().position, Point::new(60.0, 55.0));

        controller.pointer_move(&mut store, Point::new(110.0, 90.0));
        assert_eq!(store.get(id).unwrap().position, Point::new(100.0, 80.0));

        controller.pointer_up(&mut store, Point::new(120.0, 90.0));
        assert_eq!(store.get(id).unwrap().position, Point::new(110.0, 80.0));
        assert_eq!(controller.gesture(), Gesture::Idle);
    }

    #[test]
    fn cancelled_drag_keeps_last_position() {
        let (mut controller, mut store, id) = setup();
        controller.pointer_down(&mut store, Point::new(60.0, 60.0));
        controller.pointer_move(&mut store, Point::new(90.0, 60.0));
        controller.cancel();
        controller.pointer_move(&mut store, Point::new(300.0, 300.0));
        assert_eq!(store.get(id).unwrap().position, Point::new(80.0, 50.0));
    }

    #[test]
    fn pressing_another_box_moves_focus() {
        let (mut controller, mut store, first) = setup();
        let second = store.create();
        store.update_position(second, 300.0, 300.0);
        store.activate(first);

        assert!(controller.pointer_down(&mut store, Point::new(320.0, 320.0)));
        assert_eq!(store.active_id(), Some(second));
        assert!(!store.get(first).unwrap().active);
    }

    #[test]
    fn pressing_empty_space_releases_focus() {
        let (mut controller, mut store, id) = setup();
        controller.begin_editing(&store);
        assert!(controller.pointer_down(&mut store, Point::new(500.0, 5.0)));
        assert!(!store.get(id).unwrap().active);
        assert!(!controller.is_editing());
        assert_eq!(controller.gesture(), Gesture::Idle);
    }

    #[test]
    fn south_east_handle_grows_without_moving_origin() {
        let (mut controller, mut store, id) = setup();
        // box spans (50,50)-(200,90)
        controller.pointer_down(&mut store, Point::new(200.0, 90.0));
        assert!(matches!(
            controller.gesture(),
            Gesture::Resizing {
                handle: ResizeHandle::SouthEast,
                ..
            }
        ));
        controller.pointer_up(&mut store, Point::new(230.0, 110.0));
        let annotation = store.get(id).unwrap();
        assert_eq!(annotation.position, Point::new(50.0, 50.0));
        assert_eq!(annotation.size, Size::new(180.0, 60.0));
    }

    #[test]
    fn north_west_handle_shifts_origin_and_anchors_opposite_corner() {
        let (mut controller, mut store, id) = setup();
        controller.pointer_down(&mut store, Point::new(50.0, 50.0));
        controller.pointer_move(&mut store, Point::new(40.0, 45.0));
        let annotation = store.get(id).unwrap();
        assert_eq!(annotation.position, Point::new(40.0, 45.0));
        assert_eq!(annotation.size, Size::new(160.0, 45.0));

        controller.pointer_up(&mut store, Point::new(400.0, 400.0));
        let annotation = store.get(id).unwrap();
        assert_eq!(annotation.size, Size::new(20.0, 20.0));
        assert_eq!(annotation.position, Point::new(180.0, 70.0));
    }

    #[test]
    fn resizing_past_the_page_edge_keeps_opposite_edges_anchored() {
        let (mut controller, mut store, id) = setup();
        store.set_bounds(Some(Size::new(400.0, 300.0)));

        controller.pointer_down(&mut store, Point::new(50.0, 60.0));
        controller.pointer_move(&mut store, Point::new(-30.0, 60.0));
        let annotation = store.get(id).unwrap();
        assert_eq!(annotation.position, Point::new(0.0, 50.0));
        assert_eq!(annotation.size, Size::new(200.0, 40.0));
        assert_eq!(annotation.right(), 200.0);
        controller.pointer_up(&mut store, Point::new(-30.0, 60.0));

        controller.pointer_down(&mut store, Point::new(100.0, 50.0));
        controller.pointer_move(&mut store, Point::new(100.0, -80.0));
        let annotation = store.get(id).unwrap();
        assert_eq!(annotation.position, Point::new(0.0, 0.0));
        assert_eq!(annotation.bottom(), 90.0);
        controller.pointer_up(&mut store, Point::new(100.0, -80.0));

        controller.pointer_down(&mut store, Point::new(200.0, 90.0));
        controller.pointer_move(&mut store, Point::new(500.0, 400.0));
        let annotation = store.get(id).unwrap();
        assert_eq!(annotation.position, Point::new(0.0, 0.0));
        assert_eq!(annotation.size, Size::new(400.0, 300.0));
    }

    #[test]
    fn edge_handles_resize_one_axis() {
        let (mut controller, mut store, id) = setup();
        controller.pointer_down(&mut store, Point::new(120.0, 90.0));
        assert!(matches!(
            controller.gesture(),
            Gesture::Resizing {
                handle: ResizeHandle::South,
                ..
            }
        ));
        controller.pointer_up(&mut store, Point::new(10.0, 100.0));
        let annotation = store.get(id).unwrap();
        assert_eq!(annotation.size, Size::new(150.0, 50.0));
    }

    #[test]
    fn handles_only_apply_to_active_annotation() {
        let (mut controller, mut store, id) = setup();
        store.deactivate(id);
        controller.pointer_down(&mut store, Point::new(200.0, 90.0));
        assert!(matches!(controller.gesture(), Gesture::Dragging { .. }));
        assert!(store.get(id).unwrap().active);
    }

    #[test]
    fn text_editing_targets_active_annotation() {
        let (mut controller, mut store, id) = setup();
        assert!(controller.begin_editing(&store));
        controller.set_text(&mut store, "Hi");
        controller.insert_text(&mut store, " there");
        controller.backspace(&mut store);
        assert_eq!(store.get(id).unwrap().text, "Hi ther");

        controller.release_focus(&mut store);
        assert!(!controller.insert_text(&mut store, "!"));
        assert!(!controller.begin_editing(&store));
    }

    #[test]
    fn nudge_and_remove_act_on_focus() {
        let (mut controller, mut store, id) = setup();
        controller.nudge(&mut store, 5.0, -10.0);
        assert_eq!(store.get(id).unwrap().position, Point::new(55.0, 40.0));

        assert!(controller.remove_active(&mut store));
        assert!(store.is_empty());
        assert!(!controller.remove_active(&mut store));
    }
}
