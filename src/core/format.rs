//! Document format identifiers.

use std::borrow::Cow;
use std::fmt;

/// An opaque document format identifier.
///
/// Formats double as the path segment of the sidecar protocol
/// (`POST /<format>`, `GET /support/<format>`). Names built with
/// [`Format::new`] are kept verbatim; only the built-in aliases are matched
/// case-insensitively when parsing.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Format(Cow<'static, str>);

impl Format {
    /// reStructuredText
    pub const RST: Format = Format(Cow::Borrowed("rst"));

    /// AsciiDoc, as handled by the Python `asciidoc` toolchain
    pub const ASCIIDOC: Format = Format(Cow::Borrowed("asciidoc"));

    /// AsciiDoc, as handled by the Ruby `asciidoctor` gem
    pub const ASCIIDOCTOR: Format = Format(Cow::Borrowed("asciidoctor"));

    /// Create a format from an arbitrary name, kept exactly as given.
    pub fn new(name: impl Into<String>) -> Self {
        Format(Cow::Owned(name.into()))
    }

    /// Get the format name.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The formats docshim routes out of the box.
    pub fn builtin() -> [Format; 3] {
        [Format::RST, Format::ASCIIDOC, Format::ASCIIDOCTOR]
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl std::str::FromStr for Format {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let format = match s.to_lowercase().as_str() {
            "rst" | "rest" | "restructuredtext" => Format::RST,
            "asciidoc" | "adoc" => Format::ASCIIDOC,
            "asciidoctor" => Format::ASCIIDOCTOR,
            _ => Format::new(s),
        };
        Ok(format)
    }
}

impl From<&str> for Format {
    fn from(s: &str) -> Self {
        s.parse().unwrap_or_else(|never| match never {})
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_names() {
        assert_eq!(Format::RST.as_str(), "rst");
        assert_eq!(Format::ASCIIDOC.to_string(), "asciidoc");
        assert_eq!(Format::ASCIIDOCTOR.as_str(), "asciidoctor");
    }

    #[test]
    fn test_parse_aliases() {
        assert_eq!("reST".parse::<Format>().unwrap(), Format::RST);
        assert_eq!(Format::from("adoc"), Format::ASCIIDOC);
        assert_eq!(Format::from("ASCIIDOCTOR"), Format::ASCIIDOCTOR);
    }

    #[test]
    fn test_custom_names_keep_their_case() {
        assert_eq!(Format::new("MyFmt").as_str(), "MyFmt");
        assert_eq!(Format::from("MyFmt"), Format::new("MyFmt"));
        assert_ne!(Format::from("MyFmt"), Format::new("myfmt"));
    }

    #[test]
    fn test_owned_and_borrowed_compare_equal() {
        assert_eq!(Format::new("rst"), Format::RST);
    }
}
