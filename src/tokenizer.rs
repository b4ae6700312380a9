/// One raw template fragment. Marker tokens keep their delimiters so that
/// error messages can quote the offending source text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Token<'a> {
    Text(&'a str),
    /// `{{ expr }}`
    Var(&'a str),
    /// `{% tag ... %}`
    Tag(&'a str),
    /// `{# ... #}`
    Comment(&'a str),
}

impl<'a> Token<'a> {
    /// Marker content without the delimiters, trimmed.
    pub(crate) fn inner(self) -> &'a str {
        match self {
            Token::Text(s) => s,
            Token::Var(s) | Token::Tag(s) | Token::Comment(s) => s[2..s.len() - 2].trim(),
        }
    }
}

/// Split a template into text and marker tokens. Markers may span newlines;
/// an opener without its closer is left in the text as-is.
pub(crate) fn tokenize(template: &str) -> Vec<Token<'_>> {
    let mut tokens = Vec::new();
    let bytes = template.as_bytes();
    let len = template.len();
    let mut start = 0;
    let mut pos = 0;

    while pos + 1 < len {
        if bytes[pos] != b'{' {
            pos += 1;
            continue;
        }
        let closer = match bytes[pos + 1] {
            b'{' => "}}",
            b'%' => "%}",
            b'#' => "#}",
            _ => {
                pos += 1;
                continue;
            }
        };
        let Some(off) = template[pos + 2..].find(closer) else {
            // No closer ahead, the opener itself is plain text; later
            // markers still match.
            pos += 1;
            continue;
        };
        let end = pos + 2 + off + 2;
        if start < pos {
            tokens.push(Token::Text(&template[start..pos]));
        }
        let raw = &template[pos..end];
        tokens.push(match bytes[pos + 1] {
            b'{' => Token::Var(raw),
            b'%' => Token::Tag(raw),
            _ => Token::Comment(raw),
        });
        start = end;
        pos = end;
    }

    if start < len {
        tokens.push(Token::Text(&template[start..]));
    }
    tokens
}
