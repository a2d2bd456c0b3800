//! Field descriptor for protocol schemas.

use compact_str::CompactString;

use crate::protocol::FieldValue;

use super::DataKind;

/// Renders a decoded value for display.
///
/// Returning `None` falls back to the value's own `Display`.
pub type Formatter = fn(&FieldValue<'_>) -> Option<CompactString>;

/// How many bytes a field occupies on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldSize {
    /// Always this many bytes.
    Fixed(usize),
    /// A length prefix of the given width precedes the value.
    LengthPrefixed(usize),
    /// Size is not recoverable from the bytes alone.
    Variable,
}

impl FieldSize {
    /// Whether a reader can find the end of the field without outside help.
    pub fn is_walkable(&self) -> bool {
        !matches!(self, FieldSize::Variable)
    }
}

/// Static description of one protocol field.
///
/// Descriptors live in read-only tables and are referenced, never copied,
/// by decoded output. Size and rendering are independent attributes: a
/// fixed-size field may have no formatter, and a formatter never implies a
/// size.
#[derive(Clone, Copy)]
pub struct FieldDescriptor {
    /// Dotted field name (e.g., "regbus.sequence")
    pub name: &'static str,

    /// Display label
    pub display: &'static str,

    /// Semantic type
    pub kind: DataKind,

    /// Wire size
    pub size: FieldSize,

    /// Optional value formatter
    pub render: Option<Formatter>,

    /// Optional description for documentation
    pub description: Option<&'static str>,
}

impl FieldDescriptor {
    /// Create a field whose size follows from its kind.
    ///
    /// Variable-width kinds get [`FieldSize::Variable`].
    pub const fn new(name: &'static str, display: &'static str, kind: DataKind) -> Self {
        let size = match kind.fixed_size() {
            Some(n) => FieldSize::Fixed(n),
            None => FieldSize::Variable,
        };
        Self {
            name,
            display,
            kind,
            size,
            render: None,
            description: None,
        }
    }

    /// Builder: override the wire size.
    pub const fn with_size(mut self, size: FieldSize) -> Self {
        self.size = size;
        self
    }

    /// Builder: attach a formatter.
    pub const fn with_render(mut self, render: Formatter) -> Self {
        self.render = Some(render);
        self
    }

    /// Add a description to the field.
    pub const fn with_description(mut self, desc: &'static str) -> Self {
        self.description = Some(desc);
        self
    }

    /// Render `value` with the formatter, or its default display.
    pub fn render_value(&self, value: &FieldValue<'_>) -> CompactString {
        self.render
            .and_then(|render| render(value))
            .unwrap_or_else(|| compact_str::format_compact!("{value}"))
    }
}

impl std::fmt::Debug for FieldDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FieldDescriptor")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("size", &self.size)
            .field("render", &self.render.is_some())
            .finish()
    }
}

impl PartialEq for FieldDescriptor {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name && self.kind == other.kind && self.size == other.size
    }
}
