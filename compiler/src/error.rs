use thiserror::Error;

#[derive(Debug, Error)]
pub enum TrcError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Lexical error at line {line}: illegal character {ch:?}")]
    Lexical { ch: char, line: usize },

    #[error("Syntax error at line {line}, column {column}: {msg}")]
    Syntax {
        msg:    String,
        line:   usize,
        column: usize,
    },

    #[error("Semantic error at line {line}: {msg}")]
    Semantic { msg: String, line: usize },
}
