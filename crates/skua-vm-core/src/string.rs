//! String and symbol heap cells

use std::rc::Rc;

/// A JavaScript string
///
/// Text is stored as UTF-8; `length` and index access count UTF-16 code units.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JsString {
    text: Rc<str>,
}

impl JsString {
    /// Create a new string cell
    pub fn new(text: impl Into<Rc<str>>) -> Self {
        Self { text: text.into() }
    }

    /// String contents
    #[inline]
    pub fn as_str(&self) -> &str {
        &self.text
    }

    /// Shared handle to the contents
    #[inline]
    pub fn text(&self) -> Rc<str> {
        Rc::clone(&self.text)
    }

    /// Length in UTF-16 code units
    pub fn utf16_len(&self) -> usize {
        if self.text.is_ascii() {
            self.text.len()
        } else {
            self.text.encode_utf16().count()
        }
    }

    /// Code unit at `index` as a one-unit string
    pub fn unit_at(&self, index: usize) -> Option<String> {
        if self.text.is_ascii() {
            return self.text.get(index..index + 1).map(str::to_string);
        }
        let unit = self.text.encode_utf16().nth(index)?;
        Some(String::from_utf16_lossy(&[unit]))
    }
}

/// A JavaScript symbol
#[derive(Debug, Clone)]
pub struct JsSymbol {
    /// Optional description
    pub description: Option<Rc<str>>,
}

impl JsSymbol {
    /// `Symbol(description)` rendering
    pub fn descriptive_string(&self) -> String {
        format!("Symbol({})", self.description.as_deref().unwrap_or(""))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_utf16_length() {
        assert_eq!(JsString::new("abc").utf16_len(), 3);
        assert_eq!(JsString::new("é😀").utf16_len(), 3);
        assert_eq!(JsString::new("abc").unit_at(1).as_deref(), Some("b"));
        assert_eq!(JsString::new("abc").unit_at(3), None);
    }
}
