//! Page and zoom state for the document being viewed.
//!
//! Every mutator returns `true` when the viewport actually changed so the
//! caller can decide whether a redraw is needed. Out-of-range requests are
//! ignored (pages) or clamped (scale), never reported as errors.

use crate::config::ViewerConfig;

#[derive(Debug, Clone, PartialEq)]
pub struct ScaleLimits {
    pub min: f32,
    pub max: f32,
    pub step: f32,
    pub default: f32,
    pub presets: Vec<f32>,
}

impl ScaleLimits {
    pub fn from_config(config: &ViewerConfig) -> Self {
        Self {
            min: config.min_scale,
            max: config.max_scale,
            step: config.zoom_step,
            default: config.default_scale,
            presets: config.scale_presets.clone(),
        }
    }

    pub fn clamp(&self, scale: f32) -> f32 {
        if !scale.is_finite() {
            return self.default;
        }
        scale.clamp(self.min, self.max)
    }

    pub fn preset(&self, index: usize) -> Option<f32> {
        self.presets.get(index).map(|&scale| self.clamp(scale))
    }

    /// Preset closest to `scale`, used to show which preset is selected.
    pub fn nearest_preset(&self, scale: f32) -> Option<usize> {
        self.presets
            .iter()
            .enumerate()
            .min_by(|(_, a), (_, b)| {
                (*a - scale)
                    .abs()
                    .partial_cmp(&(*b - scale).abs())
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
            .map(|(index, _)| index)
    }
}

impl Default for ScaleLimits {
    fn default() -> Self {
        Self::from_config(&ViewerConfig::default())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Viewport {
    page_number: usize,
    page_count: usize,
    scale: f32,
}

impl Viewport {
    /// Fresh viewport for a newly loaded document: first page, default scale.
    pub fn new(page_count: usize, limits: &ScaleLimits) -> Self {
        Self {
            page_number: 1,
            page_count,
            scale: limits.clamp(limits.default),
        }
    }

    /// 1-based page number.
    pub fn page_number(&self) -> usize {
        self.page_number
    }

    pub fn page_index(&self) -> usize {
        self.page_number - 1
    }

    pub fn page_count(&self) -> usize {
        self.page_count
    }

    pub fn scale(&self) -> f32 {
        self.scale
    }

    pub fn zoom_percent(&self) -> u32 {
        (self.scale * 100.0).round() as u32
    }

    pub fn goto_page(&mut self, page: usize) -> bool {
        if page < 1 || page > self.page_count || page == self.page_number {
            return false;
        }
        self.page_number = page;
        true
    }

    /// Applies raw text from the page-entry prompt.
    pub fn goto_page_input(&mut self, input: &str) -> bool {
        match input.trim().parse::<usize>() {
            Ok(page) => self.goto_page(page),
            Err(_) => false,
        }
    }

    pub fn next_page(&mut self) -> bool {
        self.goto_page(self.page_number + 1)
    }

    pub fn prev_page(&mut self) -> bool {
        self.page_number > 1 && self.goto_page(self.page_number - 1)
    }

    pub fn first_page(&mut self) -> bool {
        self.goto_page(1)
    }

    pub fn last_page(&mut self) -> bool {
        self.goto_page(self.page_count)
    }

    pub fn set_scale(&mut self, scale: f32, limits: &ScaleLimits) -> bool {
        let next = limits.clamp(scale);
        if (next - self.scale).abs() <= f32::EPSILON {
            return false;
        }
        self.scale = next;
        true
    }

    pub fn zoom_in(&mut self, limits: &ScaleLimits) -> bool {
        self.set_scale(round_scale(self.scale + limits.step), limits)
    }

    pub fn zoom_out(&mut self, limits: &ScaleLimits) -> bool {
        self.set_scale(round_scale(self.scale - limits.step), limits)
    }

    pub fn select_preset(&mut self, index: usize, limits: &ScaleLimits) -> bool {
        match limits.preset(index) {
            Some(scale) => self.set_scale(scale, limits),
            None => false,
        }
    }

    pub fn reset_scale(&mut self, limits: &ScaleLimits) -> bool {
        self.set_scale(limits.default, limits)
    }
}

// Repeated 0.1 steps drift in binary floating point.
fn round_scale(scale: f32) -> f32 {
    (scale * 1000.0).round() / 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn viewport(pages: usize) -> (Viewport, ScaleLimits) {
        let limits = ScaleLimits::default();
        (Viewport::new(pages, &limits), limits)
    }

    #[test]
    fn new_viewport_starts_on_first_page_at_default_scale() {
        let (view, _) = viewport(5);
        assert_eq!(view.page_number(), 1);
        assert_eq!(view.page_index(), 0);
        assert_eq!(view.page_count(), 5);
        assert_eq!(view.scale(), 1.0);
        assert_eq!(view.zoom_percent(), 100);
    }

    #[test]
    fn goto_page_ignores_out_of_range_requests() {
        let (mut view, _) = viewport(5);
        assert!(!view.goto_page(0));
        assert!(!view.goto_page(6));
        assert_eq!(view.page_number(), 1);

        for page in 1..=5 {
            view.goto_page(page);
            assert_eq!(view.page_number(), page);
        }
    }

    #[test]
    fn page_input_ignores_non_numeric_text() {
        let (mut view, _) = viewport(5);
        assert!(view.goto_page_input(" 3 "));
        assert_eq!(view.page_number(), 3);

        for input in ["", "abc", "-1", "0", "6", "2.5"] {
            assert!(!view.goto_page_input(input), "accepted {input:?}");
            assert_eq!(view.page_number(), 3);
        }
    }

    #[test]
    fn stepping_stops_at_document_edges() {
        let (mut view, _) = viewport(2);
        assert!(!view.prev_page());
        assert!(view.next_page());
        assert!(!view.next_page());
        assert_eq!(view.page_number(), 2);
        assert!(view.first_page());
        assert!(view.last_page());
        assert_eq!(view.page_number(), 2);
    }

    #[test]
    fn scale_requests_clamp_to_limits() {
        let (mut view, limits) = viewport(1);
        view.set_scale(0.1, &limits);
        assert_eq!(view.scale(), 0.5);
        view.set_scale(10.0, &limits);
        assert_eq!(view.scale(), 3.0);
        view.set_scale(f32::NAN, &limits);
        assert_eq!(view.scale(), 1.0);
    }

    #[test]
    fn zoom_steps_stay_on_tenths_and_saturate() {
        let (mut view, limits) = viewport(1);
        for _ in 0..3 {
            view.zoom_in(&limits);
        }
        assert_eq!(view.scale(), 1.3);
        assert_eq!(view.zoom_percent(), 130);

        for _ in 0..40 {
            view.zoom_in(&limits);
        }
        assert_eq!(view.scale(), 3.0);
        assert!(!view.zoom_in(&limits));

        for _ in 0..40 {
            view.zoom_out(&limits);
        }
        assert_eq!(view.scale(), 0.5);
    }

    #[test]
    fn presets_select_known_entries_only() {
        let (mut view, limits) = viewport(1);
        assert!(view.select_preset(1, &limits));
        assert_eq!(view.scale(), 0.75);
        assert!(!view.select_preset(42, &limits));
        assert_eq!(view.scale(), 0.75);
        assert_eq!(limits.nearest_preset(1.3), Some(3));
        assert!(view.reset_scale(&limits));
        assert_eq!(view.scale(), 1.0);
    }
}
