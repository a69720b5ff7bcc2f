use crate::context::Context;
use crate::error::TrcError;
use crate::gen_cpp::{generate, Generated};
use crate::parser::parse_schema;
use crate::tokenizer::tokenize_schema;
use crate::types::Schema;
use crate::verifier::verify_schema;

/// Compile a textual schema into generated header and source text.
/// `header_name` is the path the generated source uses to include its own
/// header when the schema carries no `#header` pragma.
pub fn compile(text: &str, header_name: &str) -> Result<Generated, TrcError> {
    let schema = parse_source(text)?;
    let generated = generate(&schema, header_name);
    tracing::debug!(
        header_bytes = generated.header.len(),
        source_bytes = generated.source.len(),
        "generated code"
    );
    Ok(generated)
}

/// Tokenize, parse, and verify a schema without generating code.
pub fn parse_source(text: &str) -> Result<Schema, TrcError> {
    let tokens = tokenize_schema(text)?;
    tracing::debug!(tokens = tokens.len(), "tokenized schema");
    let mut ctx = Context::new();
    let schema = parse_schema(&tokens, &mut ctx)?;
    tracing::debug!(declarations = schema.decls.len(), "parsed schema");
    verify_schema(&schema)?;
    Ok(schema)
}
