use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};

/// Delimiters and sigils recognized by the scanner
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Syntax {
    pub open: String,
    pub close: String,
    /// Marks code executed while compiling
    pub compiler_control: char,
    /// Marks an expression written with escaping
    pub write_escaped: char,
    /// Marks an expression written verbatim
    pub write_unescaped: char,
    pub comment: char,
    /// Emits the open tag literally. Defaults to the last character of `open`.
    pub escape: Option<char>,
}

impl Default for Syntax {
    fn default() -> Self {
        Self {
            open: "{{".to_string(),
            close: "}}".to_string(),
            compiler_control: ':',
            write_escaped: '=',
            write_unescaped: '-',
            comment: '#',
            escape: None,
        }
    }
}

impl Syntax {
    /// Default sigils with custom delimiters
    pub fn delimiters(open: impl Into<String>, close: impl Into<String>) -> Self {
        Self {
            open: open.into(),
            close: close.into(),
            ..Self::default()
        }
    }

    pub fn with_escape(mut self, escape: char) -> Self {
        self.escape = Some(escape);
        self
    }

    /// The effective escape sigil
    pub fn escape_sigil(&self) -> Option<char> {
        self.escape.or_else(|| self.open.chars().last())
    }

    pub fn validate(&self) -> Result<()> {
        if self.open.is_empty() {
            return Err(Error::InvalidSyntax("open tag must not be empty".into()));
        }
        if self.close.is_empty() {
            return Err(Error::InvalidSyntax("close tag must not be empty".into()));
        }

        let mut sigils = vec![
            ("compiler_control", self.compiler_control),
            ("write_escaped", self.write_escaped),
            ("write_unescaped", self.write_unescaped),
            ("comment", self.comment),
        ];
        if let Some(escape) = self.escape_sigil() {
            sigils.push(("escape", escape));
        }

        for (i, (name, sigil)) in sigils.iter().enumerate() {
            if sigil.is_whitespace() {
                return Err(Error::InvalidSyntax(format!(
                    "{} sigil must not be whitespace",
                    name
                )));
            }
            if let Some((other, _)) = sigils[..i].iter().find(|(_, s)| s == sigil) {
                return Err(Error::InvalidSyntax(format!(
                    "{} and {} sigils are both '{}'",
                    other, name, sigil
                )));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        let syntax = Syntax::default();
        assert!(syntax.validate().is_ok());
        assert_eq!(syntax.escape_sigil(), Some('{'));
    }

    #[test]
    fn test_escape_follows_open_tag() {
        let syntax = Syntax::delimiters("<%", "%>");
        assert_eq!(syntax.escape_sigil(), Some('%'));
        assert_eq!(syntax.with_escape('?').escape_sigil(), Some('?'));
    }

    #[test]
    fn test_duplicate_sigils_rejected() {
        let syntax = Syntax {
            write_escaped: ':',
            ..Syntax::default()
        };
        let err = syntax.validate().unwrap_err();
        assert!(matches!(err, Error::InvalidSyntax(_)));
        assert!(err.to_string().contains("compiler_control"));
    }

    #[test]
    fn test_escape_colliding_with_sigil() {
        let syntax = Syntax::delimiters("{{", "}}").with_escape('=');
        assert!(syntax.validate().is_err());
    }

    #[test]
    fn test_empty_and_whitespace_rejected() {
        assert!(Syntax::delimiters("", "}}").validate().is_err());
        assert!(Syntax::delimiters("{{", "").validate().is_err());

        let syntax = Syntax {
            comment: ' ',
            ..Syntax::default()
        };
        assert!(syntax.validate().is_err());
    }
}
