use crate::error::TrcError;
use crate::types::{lookup_builtin, TypeCat};
use crate::utils::quote;
use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    pub static ref TOKEN_REGEX: Regex = Regex::new(
        r#"(//[^\n]*|\s+|::|\[\]|@[A-Za-z_][A-Za-z0-9_]*|-?\d+\.\d+|-?\d+|"[^"\n]*"|<[^>\n]*>|[A-Za-z_][A-Za-z0-9_]*|[;:,#={}\[\]])"#
    )
    .unwrap();
    static ref SKIP_RX: Regex = Regex::new(r"^(//[^\n]*|\s+)$").unwrap();
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Keyword {
    Required,
    Deprecated,
    Namespace,
    Using,
    Include,
    Header,
    Type,
    Typedef,
    Enum,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Semicolon,
    Colon,
    Comma,
    Hash,
    Scope,
    Equals,
    LBrace,
    RBrace,
    LBracket,
    RBracket,
    Array,
    Setting,
    Integer,
    Float,
    Str,
    IncludePath,
    Keyword(Keyword),
    Type(TypeCat),
    Ident,
    Eof,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind:   TokenKind,
    pub text:   String,
    pub line:   usize,
    pub column: usize,
}

fn keyword(text: &str) -> Option<Keyword> {
    Some(match text {
        "required"   => Keyword::Required,
        "deprecated" => Keyword::Deprecated,
        "namespace"  => Keyword::Namespace,
        "using"      => Keyword::Using,
        "include"    => Keyword::Include,
        "header"     => Keyword::Header,
        "type"       => Keyword::Type,
        "typedef"    => Keyword::Typedef,
        "enum"       => Keyword::Enum,
        _ => return None,
    })
}

fn classify(text: &str) -> TokenKind {
    match text {
        ";"  => return TokenKind::Semicolon,
        ":"  => return TokenKind::Colon,
        ","  => return TokenKind::Comma,
        "#"  => return TokenKind::Hash,
        "::" => return TokenKind::Scope,
        "="  => return TokenKind::Equals,
        "{"  => return TokenKind::LBrace,
        "}"  => return TokenKind::RBrace,
        "["  => return TokenKind::LBracket,
        "]"  => return TokenKind::RBracket,
        "[]" => return TokenKind::Array,
        _ => {}
    }
    let first = text.chars().next().unwrap_or('\0');
    if first == '@' {
        return TokenKind::Setting;
    }
    if first == '"' {
        return TokenKind::Str;
    }
    if first == '<' {
        return TokenKind::IncludePath;
    }
    if first.is_ascii_digit() || first == '-' {
        return if text.contains('.') {
            TokenKind::Float
        } else {
            TokenKind::Integer
        };
    }
    if let Some(kw) = keyword(text) {
        return TokenKind::Keyword(kw);
    }
    if let Some(cat) = lookup_builtin(text) {
        return TokenKind::Type(cat);
    }
    TokenKind::Ident
}

/// Split schema text into a flat token stream. Anything the token table
/// does not recognize is a fatal lexical error naming the character.
pub fn tokenize_schema(text: &str) -> Result<Vec<Token>, TrcError> {
    let mut tokens = Vec::new();
    let mut line = 1;
    let mut column = 1;
    let mut last_end = 0;

    for mat in TOKEN_REGEX.find_iter(text) {
        let start = mat.start();
        let end = mat.end();
        let part = mat.as_str();

        if start > last_end {
            let ch = text[last_end..start].chars().next().unwrap_or('\0');
            return Err(TrcError::Lexical { ch, line });
        }

        if !SKIP_RX.is_match(part) {
            tokens.push(Token {
                kind:   classify(part),
                text:   part.to_string(),
                line,
                column,
            });
        }

        let newline_count = part.matches('\n').count();
        if newline_count > 0 {
            line += newline_count;
            if let Some(last_line_part) = part.split('\n').last() {
                column = last_line_part.len() + 1;
            }
        } else {
            column += part.len();
        }

        last_end = end;
    }

    if last_end != text.len() {
        let ch = text[last_end..].chars().next().unwrap_or('\0');
        return Err(TrcError::Lexical { ch, line });
    }

    tokens.push(Token {
        kind:   TokenKind::Eof,
        text:   "".to_string(),
        line,
        column,
    });
    Ok(tokens)
}

/// Strip the delimiters from a string or include-path token.
pub fn strip_delimiters(text: &str) -> String {
    if text.len() >= 2 {
        text[1..text.len() - 1].to_string()
    } else {
        text.to_string()
    }
}

/// Helper for parser diagnostics.
pub fn describe(token: &Token) -> String {
    if token.kind == TokenKind::Eof {
        "end of input".to_string()
    } else {
        quote(&token.text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tokenize_field() {
        let input = "int32 x = 10;";
        let got = tokenize_schema(input).unwrap();
        let kinds: Vec<TokenKind> = got.iter().map(|t| t.kind).collect();
        assert_eq!(
            kinds,
            vec![
                TokenKind::Type(TypeCat::Int),
                TokenKind::Ident,
                TokenKind::Equals,
                TokenKind::Integer,
                TokenKind::Semicolon,
                TokenKind::Eof,
            ]
        );
        assert_eq!(got[0].text, "int32");
        assert_eq!(got[1].column, 7);
    }

    #[test]
    fn test_tokenize_setting_and_scope() {
        let got = tokenize_schema("@version = 2; Sim::Obj").unwrap();
        assert_eq!(got[0].kind, TokenKind::Setting);
        assert_eq!(got[0].text, "@version");
        assert_eq!(got[4].kind, TokenKind::Ident);
        assert_eq!(got[5].kind, TokenKind::Scope);
    }

    #[test]
    fn test_tokenize_include_paths() {
        let got = tokenize_schema("#include \"trc/runtime.h\" #header <sim/records.h>").unwrap();
        assert_eq!(got[1].kind, TokenKind::Keyword(Keyword::Include));
        assert_eq!(got[2].kind, TokenKind::Str);
        assert_eq!(strip_delimiters(&got[2].text), "trc/runtime.h");
        assert_eq!(got[5].kind, TokenKind::IncludePath);
        assert_eq!(strip_delimiters(&got[5].text), "sim/records.h");
    }

    #[test]
    fn test_tokenize_comments_and_lines() {
        let got = tokenize_schema("// a comment\nbool b;").unwrap();
        assert_eq!(got[0].kind, TokenKind::Type(TypeCat::Bool));
        assert_eq!(got[0].line, 2);
        assert_eq!(got[0].column, 1);
    }

    #[test]
    fn test_tokenize_illegal_character() {
        let err = tokenize_schema("int32 x = 10 $").unwrap_err();
        match err {
            TrcError::Lexical { ch, line } => {
                assert_eq!(ch, '$');
                assert_eq!(line, 1);
            }
            other => panic!("expected a lexical error, got {:?}", other),
        }
    }
}
