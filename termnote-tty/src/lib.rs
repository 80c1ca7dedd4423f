use std::io::{self, Write};

use anyhow::Result;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use crossterm::{
    cursor,
    event::{Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers, MouseButton, MouseEventKind},
    style::{Attribute, Color, Print, ResetColor, SetAttribute, SetForegroundColor},
    terminal::{Clear, ClearType},
};
use png::{BitDepth, ColorType, Encoder};
use termnote_core::{Annotation, Command, Point, PointerPhase, RenderImage, Size};

pub struct KittyRenderer<W: Write> {
    writer: W,
    image_id: u32,
    placement_id: u32,
}

pub struct DrawParams {
    pub columns: u32,
    pub rows: u32,
}

impl DrawParams {
    pub fn clamped(columns: u32, rows: u32) -> Self {
        Self {
            columns: columns.max(1),
            rows: rows.max(1),
        }
    }
}

impl<W: Write> KittyRenderer<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer,
            image_id: 1,
            placement_id: 1,
        }
    }

    pub fn writer(&mut self) -> &mut W {
        &mut self.writer
    }

    /// Transmits `image` and places it at the cursor, below the text layer.
    pub fn draw(&mut self, image: &RenderImage, params: DrawParams) -> Result<()> {
        let mut buffer = Vec::new();
        let mut encoder = Encoder::new(&mut buffer, image.width, image.height);
        encoder.set_color(ColorType::Rgba);
        encoder.set_depth(BitDepth::Eight);
        let mut writer = encoder.write_header()?;
        writer.write_image_data(&image.pixels)?;
        writer.finish()?;

        let encoded = BASE64.encode(&buffer);
        let mut chunks = encoded.as_bytes().chunks(4096).peekable();
        let mut first = true;

        while let Some(chunk) = chunks.next() {
            let more = chunks.peek().is_some();
            if first {
                write!(
                    self.writer,
                    "\u{1b}_Ga=T,f=100,C=1,q=2,i={},p={},c={},r={},s={},v={},z=-1,m={}",
                    self.image_id,
                    self.placement_id,
                    params.columns,
                    params.rows,
                    image.width,
                    image.height,
                    if more { 1 } else { 0 }
                )?;
                first = false;
            } else {
                write!(self.writer, "\u{1b}_Gm={},q=2", if more { 1 } else { 0 })?;
            }
            if !chunk.is_empty() {
                self.writer.write_all(b";")?;
                self.writer.write_all(chunk)?;
            }
            write!(self.writer, "\u{1b}\\")?;
        }

        self.writer.flush()?;
        Ok(())
    }

    /// Removes the page image; text cells are left alone.
    pub fn delete_image(&mut self) -> Result<()> {
        write!(self.writer, "\u{1b}_Ga=d,d=I,i={},q=2\u{1b}\\", self.image_id)?;
        self.writer.flush()?;
        Ok(())
    }

    pub fn begin_sync_update(&mut self) -> Result<()> {
        write!(self.writer, "\u{1b}[?2026h")?;
        Ok(())
    }

    /// Disables synchronized updates.
    /// The terminal will render all buffered changes at once.
    pub fn end_sync_update(&mut self) -> Result<()> {
        write!(self.writer, "\u{1b}[?2026l")?;
        self.writer.flush()?;
        Ok(())
    }

    /// Clears the entire screen.
    pub fn clear_all(&mut self) -> Result<()> {
        crossterm::execute!(
            &mut self.writer,
            Clear(ClearType::All),
            cursor::MoveTo(0, 0)
        )?;
        Ok(())
    }
}

/// Size of one terminal cell in pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CellMetrics {
    pub width: f32,
    pub height: f32,
}

impl CellMetrics {
    /// Used when the terminal does not report its pixel size.
    pub const FALLBACK: CellMetrics = CellMetrics {
        width: 8.0,
        height: 16.0,
    };

    pub fn from_window(columns: u16, rows: u16, pixel_width: u16, pixel_height: u16) -> Self {
        if columns == 0 || rows == 0 || pixel_width == 0 || pixel_height == 0 {
            return Self::FALLBACK;
        }
        Self {
            width: f32::from(pixel_width) / f32::from(columns),
            height: f32::from(pixel_height) / f32::from(rows),
        }
    }
}

/// A rectangle of terminal cells.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CellArea {
    pub column: u16,
    pub row: u16,
    pub columns: u16,
    pub rows: u16,
}

impl CellArea {
    pub fn contains(&self, column: u16, row: u16) -> bool {
        column >= self.column
            && column < self.column.saturating_add(self.columns)
            && row >= self.row
            && row < self.row.saturating_add(self.rows)
    }
}

/// Where the rendered page lands on screen and how terminal cells map onto
/// overlay pixels. The page is shown at its native pixel size, cropped to the
/// available area and centered horizontally.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageLayout {
    pub area: CellArea,
    pub cell: CellMetrics,
    pub visible_width: u32,
    pub visible_height: u32,
    pub page_width: u32,
    pub page_height: u32,
}

impl PageLayout {
    pub fn compute(image_width: u32, image_height: u32, available: CellArea, cell: CellMetrics) -> Self {
        let max_width = (f32::from(available.columns) * cell.width).floor() as u32;
        let max_height = (f32::from(available.rows) * cell.height).floor() as u32;
        let visible_width = image_width.min(max_width).max(1);
        let visible_height = image_height.min(max_height).max(1);

        let columns = ((visible_width as f32 / cell.width).ceil() as u16).clamp(1, available.columns.max(1));
        let rows = ((visible_height as f32 / cell.height).ceil() as u16).clamp(1, available.rows.max(1));
        let column = available.column + available.columns.saturating_sub(columns) / 2;

        Self {
            area: CellArea {
                column,
                row: available.row,
                columns,
                rows,
            },
            cell,
            visible_width,
            visible_height,
            page_width: image_width,
            page_height: image_height,
        }
    }

    /// Bounds of the overlay coordinate space: the whole rendered page.
    pub fn overlay_bounds(&self) -> Size {
        Size::new(self.page_width as f32, self.page_height as f32)
    }

    pub fn contains(&self, column: u16, row: u16) -> bool {
        self.area.contains(column, row)
    }

    /// Overlay position of the center of a cell. Cells outside the page map
    /// to positions outside the bounds; the store clamps them.
    pub fn to_overlay(&self, column: u16, row: u16) -> Point {
        let dx = f32::from(column) - f32::from(self.area.column) + 0.5;
        let dy = f32::from(row) - f32::from(self.area.row) + 0.5;
        Point::new(dx * self.cell.width, dy * self.cell.height)
    }

    /// Cells covered by an overlay rectangle, before clipping.
    fn cells_for(&self, position: Point, size: Size) -> (i32, i32, i32, i32) {
        let left = (position.x / self.cell.width).floor() as i32;
        let top = (position.y / self.cell.height).floor() as i32;
        let right = ((position.x + size.width) / self.cell.width).ceil() as i32;
        let bottom = ((position.y + size.height) / self.cell.height).ceil() as i32;
        (
            i32::from(self.area.column) + left,
            i32::from(self.area.row) + top,
            (right - left).max(2),
            (bottom - top).max(1),
        )
    }
}

/// Copies the top-left `width` x `height` region of `image`.
pub fn crop_image(image: &RenderImage, width: u32, height: u32) -> RenderImage {
    if image.width == 0 || image.height == 0 {
        return RenderImage {
            width: 0,
            height: 0,
            pixels: Vec::new(),
        };
    }

    let width = width.min(image.width).max(1);
    let height = height.min(image.height).max(1);
    if width == image.width && height == image.height {
        return image.clone();
    }

    let stride = image.width as usize * 4;
    let mut pixels = Vec::with_capacity(width as usize * height as usize * 4);
    for row in 0..height as usize {
        let start = row * stride;
        pixels.extend_from_slice(&image.pixels[start..start + width as usize * 4]);
    }

    RenderImage {
        width,
        height,
        pixels,
    }
}

/// One run of characters to print for an annotation box.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CellSpan {
    pub column: u16,
    pub row: u16,
    pub text: String,
}

/// Character runs for an annotation box clipped to the visible page.
/// Boxes three or more rows tall get a border; shorter ones are bracketed.
pub fn annotation_spans(layout: &PageLayout, annotation: &Annotation, editing: bool) -> Vec<CellSpan> {
    let (column, row, width, height) = layout.cells_for(annotation.position, annotation.size);
    let inner = (width - 2).max(0) as usize;

    let mut label: String = annotation.text.replace(['\n', '\r', '\t'], " ");
    if editing && annotation.active {
        label.push('▏');
    }
    let label: String = label.chars().take(inner).collect();
    let padded = format!("{label:<inner$}");

    let mut lines = Vec::new();
    if height >= 3 {
        lines.push(format!("┌{}┐", "─".repeat(inner)));
        let middle = (height - 2) / 2;
        for index in 0..(height - 2) {
            if index == middle {
                lines.push(format!("│{padded}│"));
            } else {
                lines.push(format!("│{}│", " ".repeat(inner)));
            }
        }
        lines.push(format!("└{}┘", "─".repeat(inner)));
    } else {
        lines.push(format!("[{padded}]"));
    }

    let min_col = i32::from(layout.area.column);
    let max_col = min_col + i32::from(layout.area.columns);
    let min_row = i32::from(layout.area.row);
    let max_row = min_row + i32::from(layout.area.rows);

    let mut spans = Vec::new();
    for (offset, line) in lines.into_iter().enumerate() {
        let line_row = row + offset as i32;
        if line_row < min_row || line_row >= max_row {
            continue;
        }
        let visible: String = line
            .chars()
            .enumerate()
            .filter(|(index, _)| {
                let col = column + *index as i32;
                col >= min_col && col < max_col
            })
            .map(|(_, ch)| ch)
            .collect();
        if visible.is_empty() {
            continue;
        }
        spans.push(CellSpan {
            column: column.max(min_col) as u16,
            row: line_row as u16,
            text: visible,
        });
    }
    spans
}

/// Draws every annotation above the page image, in creation order so later
/// boxes cover earlier ones.
pub fn draw_annotations<W: Write>(
    writer: &mut W,
    layout: &PageLayout,
    annotations: &[Annotation],
    editing: bool,
) -> Result<()> {
    for annotation in annotations {
        let color = if annotation.active {
            Color::Yellow
        } else {
            Color::Rgb {
                r: 0x66,
                g: 0x66,
                b: 0xff,
            }
        };
        for span in annotation_spans(layout, annotation, editing) {
            crossterm::queue!(
                writer,
                cursor::MoveTo(span.column, span.row),
                SetForegroundColor(color),
                SetAttribute(if annotation.active {
                    Attribute::Bold
                } else {
                    Attribute::NormalIntensity
                }),
                Print(&span.text),
                SetAttribute(Attribute::Reset),
                ResetColor
            )?;
        }
    }
    writer.flush()?;
    Ok(())
}

/// Writes `text` centered on `row`.
pub fn draw_centered<W: Write>(writer: &mut W, row: u16, total_columns: u16, text: &str) -> Result<()> {
    let width = text.chars().count() as u16;
    let column = total_columns.saturating_sub(width) / 2;
    crossterm::queue!(writer, cursor::MoveTo(column, row), Print(text))?;
    writer.flush()?;
    Ok(())
}

pub fn write_line_at<W: Write>(writer: &mut W, row: u16, label: &str, reverse: bool) -> io::Result<()> {
    crossterm::queue!(writer, cursor::MoveTo(0, row), Clear(ClearType::CurrentLine))?;
    if reverse {
        crossterm::queue!(
            writer,
            SetAttribute(Attribute::Reverse),
            Print(label),
            SetAttribute(Attribute::Reset)
        )?;
    } else {
        crossterm::queue!(writer, Print(label))?;
    }
    writer.flush()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptKind {
    Page,
    Open,
}

impl PromptKind {
    fn sigil(self) -> &'static str {
        match self {
            PromptKind::Page => "page: ",
            PromptKind::Open => "open: ",
        }
    }
}

#[derive(Debug, Clone)]
pub enum UiEvent {
    Command(Command),
    Pointer {
        phase: PointerPhase,
        column: u16,
        row: u16,
    },
    BeginPrompt(PromptKind),
    PromptChanged,
    PromptCancel,
    OpenPath { input: String },
    FileDropped { payload: String },
    ClipboardPaste,
    Resize,
    Quit,
    None,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InputMode {
    #[default]
    Normal,
    Prompt(PromptKind),
    EditText,
}

#[derive(Debug, Default)]
pub struct EventMapper {
    pending_count: Option<usize>,
    pending_digits: String,
    char_stack: String,
    mode: InputMode,
    prompt_buffer: String,
}

impl EventMapper {
    pub const NUDGE_STEP: f32 = 10.0;

    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_mode(&mut self, mode: InputMode) {
        if self.mode != mode {
            self.reset_count();
            self.reset_char_stack();
            self.prompt_buffer.clear();
            self.mode = mode;
        }
    }

    pub fn mode(&self) -> InputMode {
        self.mode
    }

    pub fn map_event(&mut self, event: Event) -> UiEvent {
        match event {
            Event::Mouse(mouse) => {
                let phase = match mouse.kind {
                    MouseEventKind::Down(MouseButton::Left) => PointerPhase::Down,
                    MouseEventKind::Drag(MouseButton::Left) => PointerPhase::Move,
                    MouseEventKind::Up(MouseButton::Left) => PointerPhase::Up,
                    _ => return UiEvent::None,
                };
                UiEvent::Pointer {
                    phase,
                    column: mouse.column,
                    row: mouse.row,
                }
            }
            Event::FocusLost => UiEvent::Pointer {
                phase: PointerPhase::Cancel,
                column: 0,
                row: 0,
            },
            Event::Resize(_, _) => UiEvent::Resize,
            Event::Key(KeyEvent { kind, .. }) if kind == KeyEventKind::Release => UiEvent::None,
            other => match self.mode {
                InputMode::Normal => self.map_event_normal(other),
                InputMode::Prompt(kind) => self.map_event_prompt(kind, other),
                InputMode::EditText => self.map_event_edit(other),
            },
        }
    }

    fn map_event_normal(&mut self, event: Event) -> UiEvent {
        match event {
            Event::Paste(payload) => {
                self.reset_count();
                self.reset_char_stack();
                UiEvent::FileDropped { payload }
            }
            Event::Key(KeyEvent {
                code, modifiers, ..
            }) => match (code, modifiers) {
                (KeyCode::Char('c'), modifiers) if modifiers.contains(KeyModifiers::CONTROL) => {
                    UiEvent::Quit
                }
                (KeyCode::Char(c), _) if self.char_stack.as_str() == "z" => {
                    self.reset_char_stack();
                    self.reset_count();
                    match c.to_digit(10) {
                        Some(digit) if digit >= 1 => UiEvent::Command(Command::SelectScalePreset {
                            index: digit as usize - 1,
                        }),
                        _ => UiEvent::None,
                    }
                }
                (KeyCode::Char(c), KeyModifiers::NONE) if c.is_ascii_digit() => {
                    if let Some(digit) = c.to_digit(10) {
                        self.push_digit(digit as usize);
                    }
                    UiEvent::None
                }
                (KeyCode::Char('z'), _) => {
                    self.reset_count();
                    if self.char_stack.is_empty() {
                        self.push_char('z');
                    }
                    UiEvent::None
                }
                (KeyCode::Left, modifiers) if modifiers.contains(KeyModifiers::SHIFT) => {
                    self.nudge(-Self::NUDGE_STEP, 0.0)
                }
                (KeyCode::Right, modifiers) if modifiers.contains(KeyModifiers::SHIFT) => {
                    self.nudge(Self::NUDGE_STEP, 0.0)
                }
                (KeyCode::Up, modifiers) if modifiers.contains(KeyModifiers::SHIFT) => {
                    self.nudge(0.0, -Self::NUDGE_STEP)
                }
                (KeyCode::Down, modifiers) if modifiers.contains(KeyModifiers::SHIFT) => {
                    self.nudge(0.0, Self::NUDGE_STEP)
                }
                (KeyCode::Char('j'), KeyModifiers::NONE)
                | (KeyCode::Down, KeyModifiers::NONE)
                | (KeyCode::Right, KeyModifiers::NONE)
                | (KeyCode::PageDown, _) => self.plain(Command::NextPage),
                (KeyCode::Char('k'), KeyModifiers::NONE)
                | (KeyCode::Up, KeyModifiers::NONE)
                | (KeyCode::Left, KeyModifiers::NONE)
                | (KeyCode::PageUp, _) => self.plain(Command::PrevPage),
                (KeyCode::Char('g'), KeyModifiers::NONE) | (KeyCode::Home, _) => {
                    self.plain(Command::FirstPage)
                }
                (KeyCode::Char('G'), _) | (KeyCode::End, _) => {
                    let command = match self.pending_count.take() {
                        Some(page) => Command::GotoPage { page },
                        None => Command::LastPage,
                    };
                    self.plain(command)
                }
                (KeyCode::Char(':'), _) => self.begin_prompt(PromptKind::Page),
                (KeyCode::Char('o'), KeyModifiers::NONE) => self.begin_prompt(PromptKind::Open),
                (KeyCode::Char('+'), _) => self.plain(Command::ZoomIn),
                (KeyCode::Char('-'), _) => self.plain(Command::ZoomOut),
                (KeyCode::Char('='), _) => self.plain(Command::ResetScale),
                (KeyCode::Char('a'), KeyModifiers::NONE) => self.plain(Command::AddText),
                (KeyCode::Enter, _) | (KeyCode::Char('i'), KeyModifiers::NONE) => {
                    self.plain(Command::BeginEdit)
                }
                (KeyCode::Esc, _) => self.plain(Command::ReleaseFocus),
                (KeyCode::Char('x'), KeyModifiers::NONE) | (KeyCode::Delete, _) => {
                    self.plain(Command::RemoveActive)
                }
                (KeyCode::Char('c'), KeyModifiers::NONE) => self.plain(Command::Clear),
                (KeyCode::Char('q'), _) => {
                    self.reset_count();
                    self.reset_char_stack();
                    UiEvent::Quit
                }
                _ => {
                    self.reset_count();
                    self.reset_char_stack();
                    UiEvent::None
                }
            },
            _ => UiEvent::None,
        }
    }

    fn map_event_prompt(&mut self, kind: PromptKind, event: Event) -> UiEvent {
        match event {
            Event::Paste(text) => {
                self.prompt_buffer.push_str(text.trim_end_matches(['\n', '\r']));
                UiEvent::PromptChanged
            }
            Event::Key(KeyEvent {
                code, modifiers, ..
            }) => match (code, modifiers) {
                (KeyCode::Esc, _) => {
                    self.set_mode(InputMode::Normal);
                    UiEvent::PromptCancel
                }
                (KeyCode::Enter, _) => {
                    let input = std::mem::take(&mut self.prompt_buffer);
                    self.set_mode(InputMode::Normal);
                    match kind {
                        PromptKind::Page => UiEvent::Command(Command::GotoPageInput { input }),
                        PromptKind::Open => UiEvent::OpenPath { input },
                    }
                }
                (KeyCode::Backspace, _) => {
                    self.prompt_buffer.pop();
                    UiEvent::PromptChanged
                }
                (KeyCode::Char(c), mods) if mods.is_empty() || mods == KeyModifiers::SHIFT => {
                    self.prompt_buffer.push(c);
                    UiEvent::PromptChanged
                }
                _ => UiEvent::None,
            },
            _ => UiEvent::None,
        }
    }

    fn map_event_edit(&mut self, event: Event) -> UiEvent {
        match event {
            Event::Paste(text) => UiEvent::Command(Command::InsertText { text }),
            Event::Key(KeyEvent {
                code, modifiers, ..
            }) => match (code, modifiers) {
                (KeyCode::Esc, _) | (KeyCode::Enter, _) => UiEvent::Command(Command::EndEdit),
                (KeyCode::Backspace, _) => UiEvent::Command(Command::Backspace),
                (KeyCode::Char('v'), modifiers) if modifiers.contains(KeyModifiers::CONTROL) => {
                    UiEvent::ClipboardPaste
                }
                (KeyCode::Char(c), mods) if mods.is_empty() || mods == KeyModifiers::SHIFT => {
                    UiEvent::Command(Command::InsertText {
                        text: c.to_string(),
                    })
                }
                _ => UiEvent::None,
            },
            _ => UiEvent::None,
        }
    }

    fn plain(&mut self, command: Command) -> UiEvent {
        self.reset_count();
        self.reset_char_stack();
        UiEvent::Command(command)
    }

    fn begin_prompt(&mut self, kind: PromptKind) -> UiEvent {
        self.set_mode(InputMode::Prompt(kind));
        UiEvent::BeginPrompt(kind)
    }

    fn nudge(&mut self, dx: f32, dy: f32) -> UiEvent {
        let multiplier = self.take_count() as f32;
        self.reset_char_stack();
        UiEvent::Command(Command::Nudge {
            dx: dx * multiplier,
            dy: dy * multiplier,
        })
    }

    fn push_digit(&mut self, digit: usize) {
        let current = self.pending_count.unwrap_or(0);
        let next = current.saturating_mul(10).saturating_add(digit);
        self.pending_count = Some(next);
        if let Some(c) = char::from_digit(digit as u32, 10) {
            self.pending_digits.push(c);
        }
    }

    fn take_count(&mut self) -> usize {
        let count = self
            .pending_count
            .take()
            .filter(|&count| count > 0)
            .unwrap_or(1);
        self.pending_digits.clear();
        count
    }

    fn reset_count(&mut self) {
        self.pending_count = None;
        self.pending_digits.clear();
    }

    fn push_char(&mut self, char: char) {
        self.char_stack.push(char);
    }

    fn reset_char_stack(&mut self) {
        self.char_stack.clear();
    }

    /// Text for the status line: the open prompt, or a pending count/prefix.
    pub fn pending_input(&self) -> Option<String> {
        match self.mode {
            InputMode::Prompt(kind) => return Some(format!("{}{}", kind.sigil(), self.prompt_buffer)),
            InputMode::EditText => return Some("-- EDIT --".to_string()),
            InputMode::Normal => {}
        }
        let mut pending = String::new();
        pending.push_str(&self.pending_digits);
        pending.push_str(&self.char_stack);
        if pending.is_empty() {
            None
        } else {
            Some(pending)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossterm::event::{KeyEventState, MouseEvent};
    use termnote_core::AnnotationId;

    #[test]
    fn kitty_draw_emits_protocol() {
        let mut renderer = KittyRenderer::new(Vec::new());
        let image = RenderImage {
            width: 1,
            height: 1,
            pixels: vec![255, 0, 0, 255],
        };

        renderer.draw(&image, DrawParams::clamped(10, 5)).unwrap();
        let output = renderer.writer;
        assert_eq!(output[0], 0x1b);
        assert_eq!(output[1], b'_');
        assert_eq!(output[2], b'G');
        let text = String::from_utf8_lossy(&output);
        assert!(text.contains("c=10,r=5"));
        assert!(text.contains("z=-1"));
    }

    #[test]
    fn kitty_delete_targets_page_image() {
        let mut renderer = KittyRenderer::new(Vec::new());
        renderer.delete_image().unwrap();
        assert_eq!(
            String::from_utf8(renderer.writer).unwrap(),
            "\u{1b}_Ga=d,d=I,i=1,q=2\u{1b}\\"
        );
    }

    fn key_event(code: KeyCode) -> Event {
        key_event_with_modifiers(code, KeyModifiers::NONE)
    }

    fn key_event_with_modifiers(code: KeyCode, modifiers: KeyModifiers) -> Event {
        Event::Key(KeyEvent {
            code,
            modifiers,
            kind: KeyEventKind::Press,
            state: KeyEventState::NONE,
        })
    }

    fn mouse_event(kind: MouseEventKind, column: u16, row: u16) -> Event {
        Event::Mouse(MouseEvent {
            kind,
            column,
            row,
            modifiers: KeyModifiers::NONE,
        })
    }

    fn layout() -> PageLayout {
        PageLayout::compute(
            400,
            320,
            CellArea {
                column: 0,
                row: 1,
                columns: 80,
                rows: 20,
            },
            CellMetrics {
                width: 10.0,
                height: 20.0,
            },
        )
    }

    fn annotation(x: f32, y: f32, width: f32, height: f32, active: bool) -> Annotation {
        let mut store = termnote_core::OverlayStore::new(Default::default());
        let id: AnnotationId = store.create();
        store.update_size(id, width, height, x, y);
        store.update_text(id, "Edit text");
        if !active {
            store.deactivate(id);
        }
        store.get(id).unwrap().clone()
    }

    #[test]
    fn cell_metrics_fall_back_without_pixel_size() {
        assert_eq!(CellMetrics::from_window(80, 24, 0, 0), CellMetrics::FALLBACK);
        let metrics = CellMetrics::from_window(100, 50, 1000, 1000);
        assert_eq!(metrics.width, 10.0);
        assert_eq!(metrics.height, 20.0);
    }

    #[test]
    fn small_page_is_centered_at_native_size() {
        let layout = layout();
        assert_eq!(layout.area.columns, 40);
        assert_eq!(layout.area.rows, 16);
        assert_eq!(layout.area.column, 20);
        assert_eq!(layout.area.row, 1);
        assert_eq!(layout.visible_width, 400);
        assert_eq!(layout.overlay_bounds(), Size::new(400.0, 320.0));
    }

    #[test]
    fn large_page_is_cropped_to_available_area() {
        let layout = PageLayout::compute(
            2000,
            3000,
            CellArea {
                column: 0,
                row: 1,
                columns: 80,
                rows: 20,
            },
            CellMetrics {
                width: 10.0,
                height: 20.0,
            },
        );
        assert_eq!(layout.area.columns, 80);
        assert_eq!(layout.area.rows, 20);
        assert_eq!(layout.visible_width, 800);
        assert_eq!(layout.visible_height, 400);
        assert_eq!(layout.overlay_bounds(), Size::new(2000.0, 3000.0));
    }

    #[test]
    fn cells_map_to_overlay_pixels() {
        let layout = layout();
        assert!(layout.contains(20, 1));
        assert!(!layout.contains(19, 1));
        assert_eq!(layout.to_overlay(20, 1), Point::new(5.0, 10.0));
        assert_eq!(layout.to_overlay(25, 4), Point::new(55.0, 70.0));
    }

    #[test]
    fn crop_keeps_top_left_region() {
        let image = RenderImage {
            width: 3,
            height: 2,
            pixels: (0..24).collect(),
        };
        let cropped = crop_image(&image, 2, 1);
        assert_eq!(cropped.width, 2);
        assert_eq!(cropped.height, 1);
        assert_eq!(cropped.pixels, (0..8).collect::<Vec<u8>>());
    }

    #[test]
    fn tall_annotation_gets_a_border() {
        let layout = layout();
        let annotation = annotation(50.0, 40.0, 150.0, 60.0, true);
        let spans = annotation_spans(&layout, &annotation, false);
        assert_eq!(spans.len(), 3);
        assert_eq!(spans[0].column, 25);
        assert_eq!(spans[0].row, 3);
        assert_eq!(spans[0].text, format!("┌{}┐", "─".repeat(13)));
        assert_eq!(spans[1].text, format!("│{:<13}│", "Edit text"));
        assert!(spans[2].text.starts_with('└'));
    }

    #[test]
    fn short_annotation_is_bracketed_and_shows_cursor_when_editing() {
        let layout = layout();
        let annotation = annotation(50.0, 40.0, 150.0, 20.0, true);
        let spans = annotation_spans(&layout, &annotation, true);
        assert_eq!(spans.len(), 1);
        assert_eq!(spans[0].text, format!("[{:<13}]", "Edit text▏"));
    }

    #[test]
    fn annotation_outside_visible_area_is_clipped() {
        let layout = layout();
        let annotation = annotation(350.0, 0.0, 150.0, 20.0, false);
        let spans = annotation_spans(&layout, &annotation, false);
        assert_eq!(spans.len(), 1);
        assert_eq!(spans[0].column, 55);
        assert_eq!(spans[0].text.chars().count(), 5);
    }

    #[test]
    fn event_mapper_maps_page_navigation() {
        let mut mapper = EventMapper::new();
        assert!(matches!(
            mapper.map_event(key_event(KeyCode::Char('j'))),
            UiEvent::Command(Command::NextPage)
        ));
        assert!(matches!(
            mapper.map_event(key_event(KeyCode::PageUp)),
            UiEvent::Command(Command::PrevPage)
        ));
        assert!(matches!(
            mapper.map_event(key_event(KeyCode::Char('g'))),
            UiEvent::Command(Command::FirstPage)
        ));
        assert!(matches!(
            mapper.map_event(key_event_with_modifiers(KeyCode::Char('G'), KeyModifiers::SHIFT)),
            UiEvent::Command(Command::LastPage)
        ));
    }

    #[test]
    fn event_mapper_uses_numeric_prefix_for_goto() {
        let mut mapper = EventMapper::new();
        mapper.map_event(key_event(KeyCode::Char('1')));
        mapper.map_event(key_event(KeyCode::Char('2')));
        assert_eq!(mapper.pending_input().as_deref(), Some("12"));

        match mapper.map_event(key_event_with_modifiers(KeyCode::Char('G'), KeyModifiers::SHIFT)) {
            UiEvent::Command(Command::GotoPage { page }) => assert_eq!(page, 12),
            other => panic!("unexpected event: {:?}", other),
        }
        assert!(mapper.pending_input().is_none());
    }

    #[test]
    fn event_mapper_z_prefix_selects_preset() {
        let mut mapper = EventMapper::new();
        assert!(matches!(
            mapper.map_event(key_event(KeyCode::Char('z'))),
            UiEvent::None
        ));
        assert_eq!(mapper.pending_input().as_deref(), Some("z"));
        match mapper.map_event(key_event(KeyCode::Char('3'))) {
            UiEvent::Command(Command::SelectScalePreset { index }) => assert_eq!(index, 2),
            other => panic!("unexpected event: {:?}", other),
        }

        mapper.map_event(key_event(KeyCode::Char('z')));
        assert!(matches!(
            mapper.map_event(key_event(KeyCode::Char('0'))),
            UiEvent::None
        ));
        assert!(mapper.pending_input().is_none());
    }

    #[test]
    fn event_mapper_shift_arrows_nudge_with_count() {
        let mut mapper = EventMapper::new();
        mapper.map_event(key_event(KeyCode::Char('3')));
        match mapper.map_event(key_event_with_modifiers(KeyCode::Right, KeyModifiers::SHIFT)) {
            UiEvent::Command(Command::Nudge { dx, dy }) => {
                assert!((dx - 3.0 * EventMapper::NUDGE_STEP).abs() < f32::EPSILON);
                assert_eq!(dy, 0.0);
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn event_mapper_page_prompt_collects_input() {
        let mut mapper = EventMapper::new();
        assert!(matches!(
            mapper.map_event(key_event(KeyCode::Char(':'))),
            UiEvent::BeginPrompt(PromptKind::Page)
        ));
        mapper.map_event(key_event(KeyCode::Char('4')));
        mapper.map_event(key_event(KeyCode::Char('x')));
        mapper.map_event(key_event(KeyCode::Backspace));
        assert_eq!(mapper.pending_input().as_deref(), Some("page: 4"));

        match mapper.map_event(key_event(KeyCode::Enter)) {
            UiEvent::Command(Command::GotoPageInput { ref input }) => assert_eq!(input, "4"),
            other => panic!("unexpected event: {:?}", other),
        }
        assert_eq!(mapper.mode(), InputMode::Normal);
    }

    #[test]
    fn event_mapper_open_prompt_accepts_pasted_path() {
        let mut mapper = EventMapper::new();
        mapper.map_event(key_event(KeyCode::Char('o')));
        mapper.map_event(Event::Paste("/tmp/a b.pdf\n".into()));
        match mapper.map_event(key_event(KeyCode::Enter)) {
            UiEvent::OpenPath { ref input } => assert_eq!(input, "/tmp/a b.pdf"),
            other => panic!("unexpected event: {:?}", other),
        }

        mapper.map_event(key_event(KeyCode::Char('o')));
        assert!(matches!(
            mapper.map_event(key_event(KeyCode::Esc)),
            UiEvent::PromptCancel
        ));
        assert!(mapper.pending_input().is_none());
    }

    #[test]
    fn event_mapper_paste_in_normal_mode_is_a_drop() {
        let mut mapper = EventMapper::new();
        match mapper.map_event(Event::Paste("file:///tmp/doc.pdf".into())) {
            UiEvent::FileDropped { ref payload } => assert_eq!(payload, "file:///tmp/doc.pdf"),
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn event_mapper_edit_mode_types_into_annotation() {
        let mut mapper = EventMapper::new();
        mapper.set_mode(InputMode::EditText);

        match mapper.map_event(key_event_with_modifiers(KeyCode::Char('Q'), KeyModifiers::SHIFT)) {
            UiEvent::Command(Command::InsertText { ref text }) => assert_eq!(text, "Q"),
            other => panic!("unexpected event: {:?}", other),
        }
        assert!(matches!(
            mapper.map_event(key_event(KeyCode::Char('q'))),
            UiEvent::Command(Command::InsertText { .. })
        ));
        assert!(matches!(
            mapper.map_event(key_event(KeyCode::Backspace)),
            UiEvent::Command(Command::Backspace)
        ));
        assert!(matches!(
            mapper.map_event(key_event_with_modifiers(KeyCode::Char('v'), KeyModifiers::CONTROL)),
            UiEvent::ClipboardPaste
        ));
        assert!(matches!(
            mapper.map_event(key_event(KeyCode::Esc)),
            UiEvent::Command(Command::EndEdit)
        ));
        assert_eq!(mapper.pending_input().as_deref(), Some("-- EDIT --"));
    }

    #[test]
    fn event_mapper_maps_left_button_gestures() {
        let mut mapper = EventMapper::new();
        let phases: Vec<_> = [
            MouseEventKind::Down(MouseButton::Left),
            MouseEventKind::Drag(MouseButton::Left),
            MouseEventKind::Up(MouseButton::Left),
        ]
        .into_iter()
        .map(|kind| match mapper.map_event(mouse_event(kind, 4, 7)) {
            UiEvent::Pointer { phase, column, row } => {
                assert_eq!((column, row), (4, 7));
                phase
            }
            other => panic!("unexpected event: {:?}", other),
        })
        .collect();
        assert_eq!(
            phases,
            vec![PointerPhase::Down, PointerPhase::Move, PointerPhase::Up]
        );

        assert!(matches!(
            mapper.map_event(mouse_event(MouseEventKind::Down(MouseButton::Right), 1, 1)),
            UiEvent::None
        ));
        assert!(matches!(
            mapper.map_event(Event::FocusLost),
            UiEvent::Pointer {
                phase: PointerPhase::Cancel,
                ..
            }
        ));
    }

    #[test]
    fn event_mapper_maps_annotation_keys() {
        let mut mapper = EventMapper::new();
        assert!(matches!(
            mapper.map_event(key_event(KeyCode::Char('a'))),
            UiEvent::Command(Command::AddText)
        ));
        assert!(matches!(
            mapper.map_event(key_event(KeyCode::Enter)),
            UiEvent::Command(Command::BeginEdit)
        ));
        assert!(matches!(
            mapper.map_event(key_event(KeyCode::Delete)),
            UiEvent::Command(Command::RemoveActive)
        ));
        assert!(matches!(
            mapper.map_event(key_event(KeyCode::Esc)),
            UiEvent::Command(Command::ReleaseFocus)
        ));
        assert!(matches!(
            mapper.map_event(key_event(KeyCode::Char('c'))),
            UiEvent::Command(Command::Clear)
        ));
        assert!(matches!(
            mapper.map_event(key_event_with_modifiers(KeyCode::Char('c'), KeyModifiers::CONTROL)),
            UiEvent::Quit
        ));
    }

    #[test]
    fn event_mapper_ignores_key_release() {
        let mut mapper = EventMapper::new();
        let release = Event::Key(KeyEvent {
            code: KeyCode::Char('j'),
            modifiers: KeyModifiers::NONE,
            kind: KeyEventKind::Release,
            state: KeyEventState::NONE,
        });
        assert!(matches!(mapper.map_event(release), UiEvent::None));
    }
}
