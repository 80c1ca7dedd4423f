//! Text-box annotations layered over the rendered page.
//!
//! Coordinates are overlay pixels with the origin at the top-left corner of
//! the rendered page surface. Annotations are not tied to a page number: the
//! same boxes stay in place while the user navigates.

use std::fmt;

use crate::config::OverlayConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AnnotationId(u64);

impl AnnotationId {
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for AnnotationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Size {
    pub width: f32,
    pub height: f32,
}

impl Size {
    pub fn new(width: f32, height: f32) -> Self {
        Self { width, height }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Annotation {
    pub id: AnnotationId,
    pub text: String,
    pub position: Point,
    pub size: Size,
    pub active: bool,
}

impl Annotation {
    pub fn right(&self) -> f32 {
        self.position.x + self.size.width
    }

    pub fn bottom(&self) -> f32 {
        self.position.y + self.size.height
    }

    /// Inclusive of the border so a press on the outline still hits.
    pub fn contains(&self, point: Point) -> bool {
        point.x >= self.position.x
            && point.x <= self.right()
            && point.y >= self.position.y
            && point.y <= self.bottom()
    }
}

#[derive(Debug, Clone)]
pub struct OverlayStore {
    annotations: Vec<Annotation>,
    next_id: u64,
    bounds: Option<Size>,
    defaults: OverlayConfig,
}

impl OverlayStore {
    pub fn new(defaults: OverlayConfig) -> Self {
        Self {
            annotations: Vec::new(),
            next_id: 1,
            bounds: None,
            defaults,
        }
    }

    pub fn annotations(&self) -> &[Annotation] {
        &self.annotations
    }

    pub fn len(&self) -> usize {
        self.annotations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.annotations.is_empty()
    }

    pub fn get(&self, id: AnnotationId) -> Option<&Annotation> {
        self.annotations.iter().find(|annotation| annotation.id == id)
    }

    pub fn active(&self) -> Option<&Annotation> {
        self.annotations.iter().find(|annotation| annotation.active)
    }

    pub fn active_id(&self) -> Option<AnnotationId> {
        self.active().map(|annotation| annotation.id)
    }

    pub fn min_size(&self) -> Size {
        Size::new(self.defaults.min_width, self.defaults.min_height)
    }

    pub fn bounds(&self) -> Option<Size> {
        self.bounds
    }

    /// Topmost annotation under `point`; later annotations sit above earlier ones.
    pub fn hit_test(&self, point: Point) -> Option<AnnotationId> {
        self.annotations
            .iter()
            .rev()
            .find(|annotation| annotation.contains(point))
            .map(|annotation| annotation.id)
    }

    /// Appends a box with the default text and placement and gives it focus.
    pub fn create(&mut self) -> AnnotationId {
        let id = AnnotationId(self.next_id);
        self.next_id += 1;

        let mut annotation = Annotation {
            id,
            text: self.defaults.default_text.clone(),
            position: Point::new(self.defaults.default_x, self.defaults.default_y),
            size: Size::new(self.defaults.default_width, self.defaults.default_height),
            active: false,
        };
        self.fit(&mut annotation);

        for other in &mut self.annotations {
            other.active = false;
        }
        annotation.active = true;
        self.annotations.push(annotation);
        tracing::debug!(%id, "annotation created");
        id
    }

    pub fn update_position(&mut self, id: AnnotationId, x: f32, y: f32) -> bool {
        let bounds = self.bounds;
        let min = self.min_size();
        let Some(annotation) = self.find_mut(id) else {
            return false;
        };
        annotation.position = Point::new(x, y);
        clamp_annotation(annotation, min, bounds);
        true
    }

    /// Sets size and origin together; a resize from the top or left edge moves
    /// the origin as well. Sizes below the minimum floor are raised to it.
    pub fn update_size(&mut self, id: AnnotationId, width: f32, height: f32, x: f32, y: f32) -> bool {
        let bounds = self.bounds;
        let min = self.min_size();
        let Some(annotation) = self.find_mut(id) else {
            return false;
        };
        annotation.size = Size::new(width, height);
        annotation.position = Point::new(x, y);
        clamp_annotation(annotation, min, bounds);
        true
    }

    pub fn update_text(&mut self, id: AnnotationId, text: impl Into<String>) -> bool {
        match self.find_mut(id) {
            Some(annotation) => {
                annotation.text = text.into();
                true
            }
            None => false,
        }
    }

    /// Gives `id` focus and removes it from every other annotation.
    pub fn activate(&mut self, id: AnnotationId) -> bool {
        if self.get(id).is_none() {
            return false;
        }
        for annotation in &mut self.annotations {
            annotation.active = annotation.id == id;
        }
        true
    }

    /// Drops focus from `id`; does nothing unless `id` is the focused one.
    pub fn deactivate(&mut self, id: AnnotationId) -> bool {
        match self.find_mut(id) {
            Some(annotation) if annotation.active => {
                annotation.active = false;
                true
            }
            _ => false,
        }
    }

    pub fn remove(&mut self, id: AnnotationId) -> bool {
        let before = self.annotations.len();
        self.annotations.retain(|annotation| annotation.id != id);
        self.annotations.len() != before
    }

    /// Drops every annotation. Identities keep counting up so a cleared id is
    /// never handed out again.
    pub fn clear(&mut self) {
        self.annotations.clear();
    }

    /// Records the size of the rendered page surface and pulls every
    /// annotation back inside it.
    pub fn set_bounds(&mut self, bounds: Option<Size>) {
        if self.bounds == bounds {
            return;
        }
        self.bounds = bounds;
        let min = self.min_size();
        for annotation in &mut self.annotations {
            clamp_annotation(annotation, min, bounds);
        }
    }

    fn find_mut(&mut self, id: AnnotationId) -> Option<&mut Annotation> {
        self.annotations
            .iter_mut()
            .find(|annotation| annotation.id == id)
    }

    fn fit(&self, annotation: &mut Annotation) {
        clamp_annotation(annotation, self.min_size(), self.bounds);
    }
}

fn clamp_annotation(annotation: &mut Annotation, min: Size, bounds: Option<Size>) {
    let mut width = finite_or(annotation.size.width, min.width).max(min.width);
    let mut height = finite_or(annotation.size.height, min.height).max(min.height);
    let mut x = finite_or(annotation.position.x, 0.0);
    let mut y = finite_or(annotation.position.y, 0.0);

    if let Some(bounds) = bounds {
        width = width.min(bounds.width.max(min.width));
        height = height.min(bounds.height.max(min.height));
        x = x.clamp(0.0, (bounds.width - width).max(0.0));
        y = y.clamp(0.0, (bounds.height - height).max(0.0));
    }

    annotation.size = Size::new(width, height);
    annotation.position = Point::new(x, y);
}

fn finite_or(value: f32, fallback: f32) -> f32 {
    if value.is_finite() {
        value
    } else {
        fallback
    }
}
