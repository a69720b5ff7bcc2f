use std::collections::{HashMap, HashSet};

use crate::error::TrcError;
use crate::types::{
    Compound, CompoundKind, Decl, FieldDecl, FieldType, Literal, MessageDecl, Schema, SimpleType,
    TopDecl, MAX_BITSET_FIELDS,
};
use crate::utils::quote;

/// Structural checks over the finished tree: duplicate field names (own and
/// inherited), bitset shape, default-literal shape. Type existence was
/// already settled at field-lookup time during parsing, and duplicate
/// (name, version) identities are impossible because the registry rejects a
/// second declaration of the same message name outright.
pub fn verify_schema(schema: &Schema) -> Result<(), TrcError> {
    let messages = collect_messages(schema);
    verify_decls(&schema.decls, &messages)
}

fn verify_decls(
    decls: &[TopDecl],
    messages: &HashMap<String, &MessageDecl>,
) -> Result<(), TrcError> {
    for decl in decls {
        match decl {
            TopDecl::Namespace { decls, .. } => verify_decls(decls, messages)?,
            TopDecl::Message(message) => {
                let inherited = inherited_field_names(message, messages);
                verify_compound(&message.compound, CompoundKind::Message, &inherited)?;
            }
        }
    }
    Ok(())
}

fn collect_messages(schema: &Schema) -> HashMap<String, &MessageDecl> {
    fn walk<'a>(decls: &'a [TopDecl], out: &mut HashMap<String, &'a MessageDecl>) {
        for decl in decls {
            match decl {
                TopDecl::Namespace { decls, .. } => walk(decls, out),
                TopDecl::Message(message) => {
                    out.insert(message.compound.name.clone(), message);
                }
            }
        }
    }
    let mut out = HashMap::new();
    walk(&schema.decls, &mut out);
    out
}

/// Field names a derived message inherits from its base chain. A field
/// redeclared over an inherited name would silently shadow base storage in
/// the generated class, so it is rejected outright.
fn inherited_field_names(
    message: &MessageDecl,
    messages: &HashMap<String, &MessageDecl>,
) -> HashSet<String> {
    let mut names = HashSet::new();
    let mut base = message.base.as_deref();
    while let Some(name) = base {
        match messages.get(name) {
            Some(parent) => {
                for field in &parent.compound.fields {
                    names.insert(field.name.clone());
                }
                base = parent.base.as_deref();
            }
            None => break,
        }
    }
    names
}

fn verify_compound(
    compound: &Compound,
    kind: CompoundKind,
    inherited: &HashSet<String>,
) -> Result<(), TrcError> {
    let mut seen: HashSet<&str> = HashSet::new();
    for field in &compound.fields {
        if inherited.contains(&field.name) || !seen.insert(field.name.as_str()) {
            return Err(TrcError::Semantic {
                msg: format!(
                    "the field {} is declared twice in {}",
                    quote(&field.name),
                    quote(&compound.name)
                ),
                line: field.line,
            });
        }
    }

    if kind == CompoundKind::Bitset {
        if compound.fields.len() > MAX_BITSET_FIELDS {
            return Err(TrcError::Semantic {
                msg: format!(
                    "the bitset {} has more than {} fields",
                    quote(&compound.name),
                    MAX_BITSET_FIELDS
                ),
                line: compound.line,
            });
        }
        for field in &compound.fields {
            if field.is_array || field.ty != FieldType::Simple(SimpleType::Bool) {
                return Err(TrcError::Semantic {
                    msg: format!("the bitset field {} must be bool", quote(&field.name)),
                    line: field.line,
                });
            }
        }
    }

    for field in &compound.fields {
        verify_default(field)?;
    }

    let empty = HashSet::new();
    for nested in &compound.nested {
        match nested {
            Decl::Group(group) => verify_compound(group, CompoundKind::Group, &empty)?,
            Decl::Bitset(bitset) => verify_compound(bitset, CompoundKind::Bitset, &empty)?,
            Decl::Enum(_) => {}
        }
    }
    Ok(())
}

fn verify_default(field: &FieldDecl) -> Result<(), TrcError> {
    let literal = match &field.default {
        Some(literal) => literal,
        None => return Ok(()),
    };
    let err = |msg: String| {
        Err(TrcError::Semantic {
            msg,
            line: field.line,
        })
    };

    if field.is_array {
        return err(format!(
            "the array field {} cannot have a default",
            quote(&field.name)
        ));
    }
    let simple = match &field.ty {
        FieldType::Simple(simple) => *simple,
        FieldType::Compound { .. } => {
            return err(format!(
                "the field {} of compound type cannot have a default",
                quote(&field.name)
            ))
        }
    };

    match simple {
        SimpleType::Bool => match literal {
            Literal::Bool(_) => Ok(()),
            _ => err(format!(
                "the default for field {} must be true or false",
                quote(&field.name)
            )),
        },
        _ if simple.is_integer() => match literal {
            Literal::Int(value) => {
                let (min, max) = simple.int_bounds().unwrap_or((i64::MIN, i64::MAX));
                if *value < min || *value > max {
                    err(format!(
                        "the default for field {} is out of range for {}",
                        quote(&field.name),
                        simple.name()
                    ))
                } else {
                    Ok(())
                }
            }
            _ => err(format!(
                "the default for field {} must be an integer",
                quote(&field.name)
            )),
        },
        SimpleType::Float | SimpleType::Double => match literal {
            Literal::Int(_) | Literal::Float(_) => Ok(()),
            _ => err(format!(
                "the default for field {} must be a number",
                quote(&field.name)
            )),
        },
        _ if simple.is_text() => match literal {
            Literal::Str(_) => Ok(()),
            _ => err(format!(
                "the default for field {} must be a string",
                quote(&field.name)
            )),
        },
        SimpleType::Vec3 => check_components(field, literal, 3),
        SimpleType::Quat => check_components(field, literal, 4),
        SimpleType::Curve => check_curve(field, literal),
        _ => Ok(()),
    }
}

/// `vec3`/`quat` defaults are component lists with an exact arity.
fn check_components(field: &FieldDecl, literal: &Literal, arity: usize) -> Result<(), TrcError> {
    let elems = match literal {
        Literal::Brace(elems) => elems,
        _ => {
            return Err(TrcError::Semantic {
                msg: format!(
                    "the default for field {} must be a component list",
                    quote(&field.name)
                ),
                line: field.line,
            })
        }
    };
    if elems.len() != arity || elems.iter().any(|e| e.second.is_some() || !is_number(&e.first)) {
        return Err(TrcError::Semantic {
            msg: format!(
                "the default for field {} must have {} numeric components",
                quote(&field.name),
                arity
            ),
            line: field.line,
        });
    }
    Ok(())
}

/// A curve default is a breakpoint table; every entry needs both halves.
fn check_curve(field: &FieldDecl, literal: &Literal) -> Result<(), TrcError> {
    let elems = match literal {
        Literal::Brace(elems) => elems,
        _ => {
            return Err(TrcError::Semantic {
                msg: format!(
                    "the default for field {} must be a breakpoint table",
                    quote(&field.name)
                ),
                line: field.line,
            })
        }
    };
    for elem in elems {
        let value_ok = match &elem.second {
            Some(value) => is_number(value),
            None => false,
        };
        if !is_number(&elem.first) || !value_ok {
            return Err(TrcError::Semantic {
                msg: format!(
                    "the curve entry in field {} is missing its value element",
                    quote(&field.name)
                ),
                line: elem.line,
            });
        }
    }
    Ok(())
}

fn is_number(literal: &Literal) -> bool {
    matches!(literal, Literal::Int(_) | Literal::Float(_))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Context;
    use crate::parser::parse_schema;
    use crate::tokenizer::tokenize_schema;

    fn verify(text: &str) -> Result<(), TrcError> {
        let tokens = tokenize_schema(text).expect("tokenize failed");
        let mut ctx = Context::new();
        let schema = parse_schema(&tokens, &mut ctx).expect("parse failed");
        verify_schema(&schema)
    }

    #[test]
    fn test_bitset_rejects_non_bool_child() {
        let err = verify("message M { bitset { bool a; int32 b; } flags; }").unwrap_err();
        match err {
            TrcError::Semantic { msg, .. } => {
                assert!(msg.contains("must be bool"), "msg = {}", msg)
            }
            other => panic!("expected a semantic error, got {:?}", other),
        }
    }

    #[test]
    fn test_duplicate_field_rejected() {
        let err = verify("message M { int32 x; float x; }").unwrap_err();
        assert!(matches!(err, TrcError::Semantic { .. }), "got {:?}", err);
    }

    #[test]
    fn test_vec3_arity_checked() {
        assert!(verify("message M { vec3 pos = { 1.0, 2.0, 3.0 }; }").is_ok());
        assert!(verify("message M { vec3 pos = { 1.0, 2.0 }; }").is_err());
    }

    #[test]
    fn test_curve_entries_need_values() {
        assert!(verify("message M { curve c = { 0: 1.5, 2: 3.0 }; }").is_ok());
        let err = verify("message M { curve c = { 0: 1.5, 2 }; }").unwrap_err();
        match err {
            TrcError::Semantic { msg, .. } => {
                assert!(msg.contains("missing its value"), "msg = {}", msg)
            }
            other => panic!("expected a semantic error, got {:?}", other),
        }
    }

    #[test]
    fn test_int_default_range() {
        assert!(verify("message M { int8 b = 127; }").is_ok());
        assert!(verify("message M { int8 b = 300; }").is_err());
    }
}
