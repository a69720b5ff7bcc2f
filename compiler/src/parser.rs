use std::collections::BTreeMap;

use crate::context::{Context, MessageInfo};
use crate::error::TrcError;
use crate::ident::message_identity;
use crate::tokenizer::{describe, strip_delimiters, Keyword, Token, TokenKind};
use crate::types::{
    Compound, CompoundKind, Decl, EnumDecl, FieldDecl, FieldType, Include, Literal, MessageDecl,
    Schema, SimpleType, TopDecl, TypeCat, BraceElem, FIRST_TAG,
};
use crate::utils::quote;

/// Parse a token stream into a schema tree, registering types and aliases
/// in `ctx` and assigning wire tags as declarations are read.
pub fn parse_schema(tokens: &[Token], ctx: &mut Context) -> Result<Schema, TrcError> {
    Parser {
        tokens,
        index: 0,
        ctx,
        scopes: Vec::new(),
    }
    .parse()
}

struct Parser<'a> {
    tokens: &'a [Token],
    index:  usize,
    ctx:    &'a mut Context,
    /// Local alias maps, innermost last. Fed by nested `typedef`s.
    scopes: Vec<BTreeMap<String, String>>,
}

impl<'a> Parser<'a> {
    fn peek(&self) -> &Token {
        &self.tokens[self.index]
    }

    fn bump(&mut self) -> Token {
        let token = self.tokens[self.index].clone();
        if self.index + 1 < self.tokens.len() {
            self.index += 1;
        }
        token
    }

    fn at(&self, kind: TokenKind) -> bool {
        self.peek().kind == kind
    }

    fn eat(&mut self, kind: TokenKind) -> bool {
        if self.at(kind) {
            self.bump();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, kind: TokenKind, expected: &str) -> Result<Token, TrcError> {
        if self.at(kind) {
            Ok(self.bump())
        } else {
            Err(self.unexpected(expected))
        }
    }

    fn unexpected(&self, expected: &str) -> TrcError {
        let token = self.peek();
        TrcError::Syntax {
            msg:    format!("expected {} but found {}", expected, describe(token)),
            line:   token.line,
            column: token.column,
        }
    }

    fn parse(mut self) -> Result<Schema, TrcError> {
        let mut schema = Schema {
            header:   None,
            includes: Vec::new(),
            decls:    Vec::new(),
        };
        let mut seen_item = false;
        while !self.at(TokenKind::Eof) {
            if self.at(TokenKind::Hash) {
                self.parse_directive(&mut schema, seen_item)?;
            } else if let Some(decl) = self.parse_top_decl()? {
                schema.decls.push(decl);
            }
            seen_item = true;
        }
        Ok(schema)
    }

    fn parse_directive(&mut self, schema: &mut Schema, seen_item: bool) -> Result<(), TrcError> {
        let hash = self.bump();
        match self.peek().kind {
            TokenKind::Keyword(Keyword::Header) => {
                self.bump();
                if seen_item {
                    return Err(TrcError::Syntax {
                        msg:    "the header pragma must appear first".to_string(),
                        line:   hash.line,
                        column: hash.column,
                    });
                }
                schema.header = Some(self.parse_include_path()?);
            }
            TokenKind::Keyword(Keyword::Include) => {
                self.bump();
                let include = self.parse_include_path()?;
                schema.includes.push(include);
            }
            _ => return Err(self.unexpected("\"header\" or \"include\"")),
        }
        Ok(())
    }

    fn parse_include_path(&mut self) -> Result<Include, TrcError> {
        let token = self.peek().clone();
        match token.kind {
            TokenKind::Str => {
                self.bump();
                Ok(Include {
                    path:   strip_delimiters(&token.text),
                    system: false,
                })
            }
            TokenKind::IncludePath => {
                self.bump();
                Ok(Include {
                    path:   strip_delimiters(&token.text),
                    system: true,
                })
            }
            _ => Err(self.unexpected("an include path")),
        }
    }

    fn parse_top_decl(&mut self) -> Result<Option<TopDecl>, TrcError> {
        match self.peek().kind {
            TokenKind::Keyword(Keyword::Namespace) => Ok(Some(self.parse_namespace()?)),
            TokenKind::Keyword(Keyword::Using) => {
                self.parse_using()?;
                Ok(None)
            }
            TokenKind::Keyword(Keyword::Typedef) => {
                self.parse_typedef(None)?;
                Ok(None)
            }
            TokenKind::Keyword(Keyword::Type) => {
                self.parse_extern_type()?;
                Ok(None)
            }
            TokenKind::Type(TypeCat::Message) => Ok(Some(TopDecl::Message(self.parse_message()?))),
            _ => Err(self.unexpected("a declaration")),
        }
    }

    fn parse_namespace(&mut self) -> Result<TopDecl, TrcError> {
        self.bump();
        let name = self.expect(TokenKind::Ident, "an identifier")?;
        self.expect(TokenKind::LBrace, "\"{\"")?;
        let mut decls = Vec::new();
        while !self.eat(TokenKind::RBrace) {
            if self.at(TokenKind::Eof) {
                return Err(self.unexpected("\"}\""));
            }
            if let Some(decl) = self.parse_top_decl()? {
                decls.push(decl);
            }
        }
        Ok(TopDecl::Namespace {
            name: name.text,
            decls,
        })
    }

    fn parse_qualified_id(&mut self) -> Result<(String, usize), TrcError> {
        let first = self.expect(TokenKind::Ident, "an identifier")?;
        let line = first.line;
        let mut name = first.text;
        while self.eat(TokenKind::Scope) {
            let segment = self.expect(TokenKind::Ident, "an identifier")?;
            name.push_str("::");
            name.push_str(&segment.text);
        }
        Ok((name, line))
    }

    fn parse_using(&mut self) -> Result<(), TrcError> {
        self.bump();
        let (target, _) = self.parse_qualified_id()?;
        self.expect(TokenKind::Semicolon, "\";\"")?;
        let local = target.rsplit("::").next().unwrap_or(&target).to_string();
        self.ctx.alias(local, target);
        Ok(())
    }

    /// `typedef Qualified::Id LocalName;` — registered globally at the top
    /// level, or into the innermost compound's alias map when nested.
    fn parse_typedef(&mut self, compound: Option<&mut Compound>) -> Result<(), TrcError> {
        self.bump();
        let (target, _) = self.parse_qualified_id()?;
        let local = self.expect(TokenKind::Ident, "an identifier")?;
        self.expect(TokenKind::Semicolon, "\";\"")?;
        match compound {
            Some(compound) => {
                compound
                    .aliases
                    .insert(local.text.clone(), target.clone());
                if let Some(scope) = self.scopes.last_mut() {
                    scope.insert(local.text, target);
                }
            }
            None => self.ctx.alias(local.text, target),
        }
        Ok(())
    }

    fn parse_extern_type(&mut self) -> Result<(), TrcError> {
        self.bump();
        let (name, line) = self.parse_qualified_id()?;
        self.expect(TokenKind::Semicolon, "\";\"")?;
        self.ctx.define(&name, CompoundKind::External, line)
    }

    fn parse_message(&mut self) -> Result<MessageDecl, TrcError> {
        self.bump();
        let name_token = self.expect(TokenKind::Ident, "an identifier")?;
        let name = name_token.text.clone();

        let mut base = None;
        if self.eat(TokenKind::Colon) {
            let base_token = self.expect(TokenKind::Ident, "an identifier")?;
            match self.ctx.resolve(&base_token.text) {
                Some((canonical, CompoundKind::Message)) => base = Some(canonical),
                _ => {
                    return Err(TrcError::Semantic {
                        msg:  format!("unknown base message {}", quote(&base_token.text)),
                        line: base_token.line,
                    })
                }
            }
        }

        self.ctx.define(&name, CompoundKind::Message, name_token.line)?;
        let first_tag = self.ctx.first_tag(base.as_deref());

        let mut compound = Compound::new(name.clone(), name_token.line);
        self.expect(TokenKind::LBrace, "\"{\"")?;
        let next_tag = self.parse_compound_body(&mut compound, first_tag, true)?;

        let version = match compound.options.get("version") {
            Some(Literal::Int(version)) => *version,
            _ => base
                .as_deref()
                .and_then(|b| self.ctx.message_info(b))
                .map(|info| info.version)
                .unwrap_or(0),
        };
        self.ctx.set_message_info(&name, MessageInfo { next_tag, version });

        let identity = message_identity(&name, version);
        Ok(MessageDecl {
            compound,
            base,
            version,
            identity,
        })
    }

    /// Parse `{ ... }` body contents after the opening brace, assigning tags
    /// from `first_tag` onward. `allow_nested` is false for bitsets, whose
    /// bodies hold plain fields only. Errors abort the whole compilation, so
    /// the scope stack is not unwound on the error path.
    fn parse_compound_body(
        &mut self,
        compound: &mut Compound,
        first_tag: u32,
        allow_nested: bool,
    ) -> Result<u32, TrcError> {
        self.scopes.push(BTreeMap::new());
        let mut next_tag = first_tag;
        while !self.eat(TokenKind::RBrace) {
            match self.peek().kind {
                TokenKind::Eof => return Err(self.unexpected("\"}\"")),
                TokenKind::Keyword(Keyword::Typedef) if allow_nested => {
                    self.parse_typedef(Some(&mut *compound))?;
                }
                TokenKind::Keyword(Keyword::Enum) if allow_nested => {
                    let decl = self.parse_enum()?;
                    compound.nested.push(Decl::Enum(decl));
                }
                TokenKind::Type(TypeCat::Group) if allow_nested => {
                    self.parse_nested_compound(compound, &mut next_tag, CompoundKind::Group)?;
                }
                TokenKind::Type(TypeCat::Bitset) if allow_nested => {
                    self.parse_nested_compound(compound, &mut next_tag, CompoundKind::Bitset)?;
                }
                TokenKind::Setting if allow_nested => {
                    self.parse_option(compound)?;
                }
                _ => {
                    self.parse_field(compound, &mut next_tag)?;
                }
            }
        }
        self.scopes.pop();
        Ok(next_tag)
    }

    /// `group Name { ... }` / `bitset Name { ... }` declare a reusable
    /// shape; the anonymous forms `group { ... } id;` / `bitset { ... } id;`
    /// synthesize a name and instantiate the shape as a field on the spot.
    fn parse_nested_compound(
        &mut self,
        parent: &mut Compound,
        next_tag: &mut u32,
        kind: CompoundKind,
    ) -> Result<(), TrcError> {
        let keyword_token = self.bump();
        let kind_word: &'static str = match kind {
            CompoundKind::Group => "group",
            _ => "bitset",
        };

        if self.at(TokenKind::Ident) {
            let name_token = self.bump();
            self.ctx.define(&name_token.text, kind, name_token.line)?;
            let mut nested = Compound::new(name_token.text.clone(), name_token.line);
            self.expect(TokenKind::LBrace, "\"{\"")?;
            self.parse_compound_body(&mut nested, FIRST_TAG, kind == CompoundKind::Group)?;
            parent.nested.push(match kind {
                CompoundKind::Group => Decl::Group(nested),
                _ => Decl::Bitset(nested),
            });
            return Ok(());
        }

        let anon = self.ctx.anon_name(kind_word);
        self.ctx.define(&anon, kind, keyword_token.line)?;
        let mut nested = Compound::new(anon.clone(), keyword_token.line);
        self.expect(TokenKind::LBrace, "\"{\"")?;
        self.parse_compound_body(&mut nested, FIRST_TAG, kind == CompoundKind::Group)?;
        parent.nested.push(match kind {
            CompoundKind::Group => Decl::Group(nested),
            _ => Decl::Bitset(nested),
        });

        let field_token = self.expect(TokenKind::Ident, "an identifier")?;
        self.expect(TokenKind::Semicolon, "\";\"")?;
        let tag = *next_tag;
        *next_tag += 1;
        parent.fields.push(FieldDecl {
            name:       field_token.text,
            line:       field_token.line,
            ty:         FieldType::Compound { name: anon, kind },
            is_array:   false,
            required:   false,
            deprecated: false,
            default:    None,
            tag,
        });
        Ok(())
    }

    fn parse_enum(&mut self) -> Result<EnumDecl, TrcError> {
        let keyword_token = self.bump();
        let name = self.ctx.anon_name("enum");
        self.expect(TokenKind::LBrace, "\"{\"")?;
        let mut values = Vec::new();
        let mut next = 0i64;
        loop {
            let id = self.expect(TokenKind::Ident, "an identifier")?;
            let value = if self.eat(TokenKind::Equals) {
                let token = self.expect(TokenKind::Integer, "an integer")?;
                self.parse_int(&token)?
            } else {
                next
            };
            next = value + 1;
            values.push((id.text, value));
            if !self.eat(TokenKind::Comma) {
                break;
            }
        }
        self.expect(TokenKind::RBrace, "\"}\"")?;
        self.expect(TokenKind::Semicolon, "\";\"")?;
        Ok(EnumDecl {
            name,
            line: keyword_token.line,
            values,
        })
    }

    fn parse_option(&mut self, compound: &mut Compound) -> Result<(), TrcError> {
        let setting = self.bump();
        let option_name = setting.text[1..].to_string();
        self.expect(TokenKind::Equals, "\"=\"")?;
        let value = self.parse_scalar_literal()?;
        self.expect(TokenKind::Semicolon, "\";\"")?;

        if option_name == "version" && !matches!(value, Literal::Int(_)) {
            return Err(TrcError::Semantic {
                msg:  "the version option must be an integer".to_string(),
                line: setting.line,
            });
        }
        if option_name == "storage" {
            match &value {
                Literal::Str(name) => compound.storage = Some(name.clone()),
                _ => {
                    return Err(TrcError::Semantic {
                        msg:  "the storage option must be a name".to_string(),
                        line: setting.line,
                    })
                }
            }
        }
        compound.options.insert(option_name, value);
        Ok(())
    }

    fn parse_field(&mut self, compound: &mut Compound, next_tag: &mut u32) -> Result<(), TrcError> {
        let mut required = false;
        let mut deprecated = false;
        if self.eat(TokenKind::Keyword(Keyword::Required)) {
            required = true;
        } else if self.eat(TokenKind::Keyword(Keyword::Deprecated)) {
            deprecated = true;
        }

        let type_token = self.peek().clone();
        enum RawType {
            Simple(SimpleType),
            Named(String, usize),
        }
        let raw = match type_token.kind {
            TokenKind::Type(cat) if is_value_category(cat) => {
                self.bump();
                let simple = SimpleType::from_name(&type_token.text).ok_or_else(|| {
                    TrcError::Semantic {
                        msg:  format!("unknown data type {}", quote(&type_token.text)),
                        line: type_token.line,
                    }
                })?;
                RawType::Simple(simple)
            }
            TokenKind::Ident => {
                let (name, line) = self.parse_qualified_id()?;
                RawType::Named(name, line)
            }
            _ => return Err(self.unexpected("a type name")),
        };

        let is_array = if self.eat(TokenKind::Array) {
            true
        } else if self.eat(TokenKind::LBracket) {
            self.expect(TokenKind::RBracket, "\"]\"")?;
            true
        } else {
            false
        };

        let name_token = self.expect(TokenKind::Ident, "an identifier")?;

        let ty = match raw {
            RawType::Simple(simple) => FieldType::Simple(simple),
            RawType::Named(type_name, line) => match self.resolve_type(&type_name) {
                Some((canonical, kind)) => FieldType::Compound {
                    name: canonical,
                    kind,
                },
                None => {
                    return Err(TrcError::Semantic {
                        msg: format!(
                            "unknown data type {} for field {}",
                            quote(&type_name),
                            quote(&name_token.text)
                        ),
                        line,
                    })
                }
            },
        };

        let default = if self.eat(TokenKind::Equals) {
            Some(self.parse_literal()?)
        } else {
            None
        };
        self.expect(TokenKind::Semicolon, "\";\"")?;

        let tag = *next_tag;
        *next_tag += 1;
        compound.fields.push(FieldDecl {
            name: name_token.text,
            line: name_token.line,
            ty,
            is_array,
            required,
            deprecated,
            default,
            tag,
        });
        Ok(())
    }

    /// Lookup order: innermost local alias maps, then the global context.
    fn resolve_type(&self, name: &str) -> Option<(String, CompoundKind)> {
        for scope in self.scopes.iter().rev() {
            if let Some(target) = scope.get(name) {
                return self.ctx.resolve(target);
            }
        }
        self.ctx.resolve(name)
    }

    fn parse_literal(&mut self) -> Result<Literal, TrcError> {
        if self.at(TokenKind::LBrace) {
            return self.parse_brace_literal();
        }
        self.parse_scalar_literal()
    }

    fn parse_scalar_literal(&mut self) -> Result<Literal, TrcError> {
        let token = self.peek().clone();
        match token.kind {
            TokenKind::Integer => {
                self.bump();
                Ok(Literal::Int(self.parse_int(&token)?))
            }
            TokenKind::Float => {
                self.bump();
                let value = token.text.parse::<f64>().map_err(|_| TrcError::Syntax {
                    msg:    format!("invalid number {}", quote(&token.text)),
                    line:   token.line,
                    column: token.column,
                })?;
                Ok(Literal::Float(value))
            }
            TokenKind::Str => {
                self.bump();
                Ok(Literal::Str(strip_delimiters(&token.text)))
            }
            TokenKind::Ident if token.text == "true" => {
                self.bump();
                Ok(Literal::Bool(true))
            }
            TokenKind::Ident if token.text == "false" => {
                self.bump();
                Ok(Literal::Bool(false))
            }
            TokenKind::Ident => {
                self.bump();
                Ok(Literal::Str(token.text))
            }
            _ => Err(self.unexpected("a value")),
        }
    }

    fn parse_brace_literal(&mut self) -> Result<Literal, TrcError> {
        self.bump();
        let mut elems = Vec::new();
        if !self.eat(TokenKind::RBrace) {
            loop {
                let line = self.peek().line;
                let first = self.parse_scalar_literal()?;
                let second = if self.eat(TokenKind::Colon) {
                    Some(self.parse_scalar_literal()?)
                } else {
                    None
                };
                elems.push(BraceElem {
                    first,
                    second,
                    line,
                });
                if !self.eat(TokenKind::Comma) {
                    break;
                }
            }
            self.expect(TokenKind::RBrace, "\"}\"")?;
        }
        Ok(Literal::Brace(elems))
    }

    fn parse_int(&self, token: &Token) -> Result<i64, TrcError> {
        token.text.parse::<i64>().map_err(|_| TrcError::Syntax {
            msg:    format!("invalid integer {}", quote(&token.text)),
            line:   token.line,
            column: token.column,
        })
    }
}

fn is_value_category(cat: TypeCat) -> bool {
    matches!(
        cat,
        TypeCat::Bool | TypeCat::Int | TypeCat::Float | TypeCat::Str | TypeCat::Domain
    )
}
