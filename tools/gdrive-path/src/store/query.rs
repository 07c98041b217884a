use std::fmt;

use crate::object::MIMETYPE_FOLDER;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    Eq,
    Ne,
}

impl Op {
    /// Applies the operator to the outcome of an equality test.
    pub fn apply(self, equal: bool) -> bool {
        match self {
            Op::Eq => equal,
            Op::Ne => !equal,
        }
    }

    fn as_str(self) -> &'static str {
        match self {
            Op::Eq => "=",
            Op::Ne => "!=",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Predicate {
    Title(Op, String),
    MimeType(Op, String),
    Trashed(bool),
    /// A clause we do not understand, forwarded to the store untouched.
    Raw(String),
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Predicate::Title(op, title) => {
                write!(f, "title {} '{}'", op.as_str(), escape_quotes(title))
            }
            Predicate::MimeType(op, mime) => {
                write!(f, "mimeType {} '{}'", op.as_str(), escape_quotes(mime))
            }
            Predicate::Trashed(trashed) => write!(f, "trashed = {trashed}"),
            Predicate::Raw(clause) => f.write_str(clause),
        }
    }
}

/// Conjunction of child-listing predicates.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Query {
    predicates: Vec<Predicate>,
}

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn title(mut self, title: &str) -> Self {
        self.predicates.push(Predicate::Title(Op::Eq, title.to_string()));
        self
    }

    pub fn not_trashed(mut self) -> Self {
        self.predicates.push(Predicate::Trashed(false));
        self
    }

    pub fn folders(mut self) -> Self {
        self.predicates
            .push(Predicate::MimeType(Op::Eq, MIMETYPE_FOLDER.to_string()));
        self
    }

    pub fn non_folders(mut self) -> Self {
        self.predicates
            .push(Predicate::MimeType(Op::Ne, MIMETYPE_FOLDER.to_string()));
        self
    }

    pub fn predicates(&self) -> &[Predicate] {
        &self.predicates
    }

    pub fn is_empty(&self) -> bool {
        self.predicates.is_empty()
    }

    /// Parses a user supplied filter such as
    /// `title = 'a' and trashed = false`. Clauses that are not a simple
    /// comparison on `title`, `mimeType` or `trashed` become
    /// [`Predicate::Raw`], so any filter the store accepts still goes through.
    pub fn parse(filter: &str) -> Self {
        let predicates = split_conjunction(filter)
            .into_iter()
            .map(str::trim)
            .filter(|clause| !clause.is_empty())
            .map(parse_clause)
            .collect();
        Self { predicates }
    }
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (idx, predicate) in self.predicates.iter().enumerate() {
            if idx > 0 {
                f.write_str(" and ")?;
            }
            write!(f, "{predicate}")?;
        }
        Ok(())
    }
}

/// Escapes backslashes and single quotes for use inside a quoted literal.
pub fn escape_quotes(value: &str) -> String {
    if !value.contains(['\'', '\\']) {
        return value.to_string();
    }
    value.replace('\\', "\\\\").replace('\'', "\\'")
}

/// Splits on `and` outside of quoted literals.
fn split_conjunction(filter: &str) -> Vec<&str> {
    const AND: &[u8] = b" and ";

    let bytes = filter.as_bytes();
    let mut clauses = Vec::new();
    let mut start = 0;
    let mut in_quote = false;
    let mut escaped = false;

    for (idx, c) in filter.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match c {
            '\\' if in_quote => escaped = true,
            '\'' => in_quote = !in_quote,
            ' ' if !in_quote
                && idx >= start
                && bytes.len() >= idx + AND.len()
                && bytes[idx..idx + AND.len()].eq_ignore_ascii_case(AND) =>
            {
                clauses.push(&filter[start..idx]);
                start = idx + AND.len();
            }
            _ => {}
        }
    }
    clauses.push(&filter[start..]);
    clauses
}

fn parse_clause(clause: &str) -> Predicate {
    let raw = || Predicate::Raw(clause.to_string());

    let Some(pos) = clause.find('=') else {
        return raw();
    };
    let (lhs, op) = match clause[..pos].strip_suffix('!') {
        Some(lhs) => (lhs, Op::Ne),
        None => (&clause[..pos], Op::Eq),
    };
    let field = lhs.trim();
    let value = clause[pos + 1..].trim();

    match field {
        "title" => unquote(value).map_or_else(raw, |v| Predicate::Title(op, v)),
        "mimeType" => unquote(value).map_or_else(raw, |v| Predicate::MimeType(op, v)),
        "trashed" => match value {
            "true" => Predicate::Trashed(op.apply(true)),
            "false" => Predicate::Trashed(!op.apply(true)),
            _ => raw(),
        },
        _ => raw(),
    }
}

/// Strips the surrounding quotes of a literal and resolves its escapes.
/// Returns `None` unless the whole value is one quoted literal.
fn unquote(value: &str) -> Option<String> {
    let inner = value.strip_prefix('\'')?;
    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();

    while let Some(c) = chars.next() {
        match c {
            '\\' => out.push(chars.next()?),
            '\'' => return chars.as_str().is_empty().then_some(out),
            _ => out.push(c),
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_renders_drive_syntax() {
        let query = Query::new().title("photos").not_trashed().folders();
        assert_eq!(
            query.to_string(),
            "title = 'photos' and trashed = false and mimeType = 'application/vnd.google-apps.folder'"
        );
    }

    #[test]
    fn test_titles_are_escaped() {
        let query = Query::new().title(r"it's a\b");
        assert_eq!(query.to_string(), r"title = 'it\'s a\\b'");
    }

    #[test]
    fn test_parse_known_clauses() {
        let query =
            Query::parse("title != 'a and b' AND trashed = false and mimeType = 'text/plain'");
        assert_eq!(
            query.predicates(),
            &[
                Predicate::Title(Op::Ne, "a and b".into()),
                Predicate::Trashed(false),
                Predicate::MimeType(Op::Eq, "text/plain".into()),
            ]
        );
    }

    #[test]
    fn test_parse_unescapes_literals() {
        let query = Query::parse(r"title = 'it\'s'");
        assert_eq!(query.predicates(), &[Predicate::Title(Op::Eq, "it's".into())]);
        assert_eq!(query.to_string(), r"title = 'it\'s'");
    }

    #[test]
    fn test_parse_trashed_negation() {
        assert_eq!(
            Query::parse("trashed != false").predicates(),
            &[Predicate::Trashed(true)]
        );
    }

    #[test]
    fn test_parse_keeps_unknown_clauses_verbatim() {
        let query = Query::parse("'root' in parents and title = 'x' or title = 'y'");
        assert_eq!(
            query.predicates(),
            &[
                Predicate::Raw("'root' in parents".into()),
                Predicate::Raw("title = 'x' or title = 'y'".into()),
            ]
        );
        assert_eq!(
            query.to_string(),
            "'root' in parents and title = 'x' or title = 'y'"
        );
    }

    #[test]
    fn test_parse_blank() {
        assert!(Query::parse("  ").is_empty());
    }
}
