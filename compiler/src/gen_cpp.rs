use std::collections::HashMap;

use crate::emitter::Emitter;
use crate::ident::identity_value;
use crate::types::{
    bitset_default_word, Compound, CompoundKind, Decl, FieldDecl, FieldType, Include, Literal,
    MessageDecl, Schema, SimpleType, TopDecl,
};

/// The two generated translation units.
#[derive(Debug, Clone, PartialEq)]
pub struct Generated {
    pub header: String,
    pub source: String,
}

/// Walk the declaration tree once, depth-first, and emit the header and
/// source texts. Purely textual; identical input yields identical output.
pub fn generate(schema: &Schema, header_name: &str) -> Generated {
    let ctx = GenCtx::collect(schema);
    let mut h = Emitter::new();
    let mut s = Emitter::new();

    let header_include = schema.header.clone().unwrap_or(Include {
        path:   header_name.to_string(),
        system: false,
    });
    let guard = guard_macro(&header_include.path);

    h.line("// Generated by trc. Do not edit.");
    h.line(&format!("#ifndef {}", guard));
    h.line(&format!("#define {}", guard));
    h.blank();
    h.line("#include <stdint.h>");
    h.line("#include <ostream>");
    h.line("#include <string>");
    h.line("#include <vector>");
    if !schema.includes.is_empty() {
        h.blank();
        for include in &schema.includes {
            h.line(&format!("#include {}", include_text(include)));
        }
    }

    s.line("// Generated by trc. Do not edit.");
    s.line(&format!("#include {}", include_text(&header_include)));

    for decl in &schema.decls {
        gen_top(&ctx, decl, &mut h, &mut s);
    }

    h.blank();
    h.line(&format!("#endif // {}", guard));
    Generated {
        header: h.finish(),
        source: s.finish(),
    }
}

fn include_text(include: &Include) -> String {
    if include.system {
        format!("<{}>", include.path)
    } else {
        format!("\"{}\"", include.path)
    }
}

fn guard_macro(path: &str) -> String {
    path.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_uppercase()
            } else {
                '_'
            }
        })
        .collect()
}

struct GenCtx<'a> {
    /// Registry name of a compound -> its qualified C++ name.
    cpp:      HashMap<String, String>,
    messages: HashMap<String, &'a MessageDecl>,
}

impl<'a> GenCtx<'a> {
    fn collect(schema: &'a Schema) -> GenCtx<'a> {
        let mut ctx = GenCtx {
            cpp:      HashMap::new(),
            messages: HashMap::new(),
        };
        fn walk_nested<'a>(compound: &'a Compound, prefix: &str, ctx: &mut GenCtx<'a>) {
            for nested in &compound.nested {
                match nested {
                    Decl::Group(inner) | Decl::Bitset(inner) => {
                        let path = format!("{}{}", prefix, inner.class_name());
                        ctx.cpp.insert(inner.name.clone(), path.clone());
                        walk_nested(inner, &format!("{}::", path), ctx);
                    }
                    Decl::Enum(_) => {}
                }
            }
        }
        fn walk_top<'a>(decls: &'a [TopDecl], prefix: &str, ctx: &mut GenCtx<'a>) {
            for decl in decls {
                match decl {
                    TopDecl::Namespace { name, decls } => {
                        walk_top(decls, &format!("{}{}::", prefix, name), ctx);
                    }
                    TopDecl::Message(message) => {
                        let path = format!("{}{}", prefix, message.compound.class_name());
                        ctx.cpp.insert(message.compound.name.clone(), path.clone());
                        ctx.messages
                            .insert(message.compound.name.clone(), message);
                        walk_nested(&message.compound, &format!("{}::", path), ctx);
                    }
                }
            }
        }
        walk_top(&schema.decls, "", &mut ctx);
        ctx
    }

    fn cpp_ref(&self, name: &str) -> String {
        self.cpp.get(name).cloned().unwrap_or_else(|| name.to_string())
    }

    /// Base-chain fields first, declaration order within each message.
    fn flatten_fields(&self, message: &'a MessageDecl) -> Vec<&'a FieldDecl> {
        let mut chain = Vec::new();
        let mut current = Some(message);
        while let Some(msg) = current {
            chain.push(msg);
            current = msg
                .base
                .as_deref()
                .and_then(|base| self.messages.get(base).copied());
        }
        chain.reverse();
        chain
            .iter()
            .flat_map(|msg| msg.compound.fields.iter())
            .collect()
    }
}

/// How a field is stored inside the generated class.
enum Slot {
    Value(SimpleType),
    ValueArray(SimpleType),
    Owned(String),
    Shared(String),
    OwnedArray(String),
    SharedArray(String),
}

fn slot(ctx: &GenCtx, field: &FieldDecl) -> Slot {
    match &field.ty {
        FieldType::Simple(simple) => {
            if field.is_array {
                Slot::ValueArray(*simple)
            } else {
                Slot::Value(*simple)
            }
        }
        FieldType::Compound { name, kind } => {
            let cpp = ctx.cpp_ref(name);
            match (kind, field.is_array) {
                (CompoundKind::Message, false) => Slot::Shared(cpp),
                (CompoundKind::Message, true) => Slot::SharedArray(cpp),
                (_, false) => Slot::Owned(cpp),
                (_, true) => Slot::OwnedArray(cpp),
            }
        }
    }
}

fn needs_dtor(fields: &[FieldDecl]) -> bool {
    fields.iter().any(|field| {
        matches!(
            slot_kind(field),
            SlotKind::Owned | SlotKind::OwnedArray | SlotKind::SharedArray
        )
    })
}

#[derive(PartialEq)]
enum SlotKind {
    Value,
    ValueArray,
    Owned,
    Shared,
    OwnedArray,
    SharedArray,
}

fn slot_kind(field: &FieldDecl) -> SlotKind {
    match &field.ty {
        FieldType::Simple(_) => {
            if field.is_array {
                SlotKind::ValueArray
            } else {
                SlotKind::Value
            }
        }
        FieldType::Compound { kind, .. } => match (kind, field.is_array) {
            (CompoundKind::Message, false) => SlotKind::Shared,
            (CompoundKind::Message, true) => SlotKind::SharedArray,
            (_, false) => SlotKind::Owned,
            (_, true) => SlotKind::OwnedArray,
        },
    }
}

fn gen_top<'a>(ctx: &GenCtx<'a>, decl: &'a TopDecl, h: &mut Emitter, s: &mut Emitter) {
    match decl {
        TopDecl::Namespace { name, decls } => {
            h.blank();
            h.line(&format!("namespace {} {{", name));
            s.blank();
            s.line(&format!("namespace {} {{", name));
            for inner in decls {
                gen_top(ctx, inner, h, s);
            }
            h.blank();
            h.line(&format!("}} // namespace {}", name));
            s.blank();
            s.line(&format!("}} // namespace {}", name));
        }
        TopDecl::Message(message) => gen_message(ctx, message, h, s),
    }
}

fn gen_message<'a>(ctx: &GenCtx<'a>, message: &'a MessageDecl, h: &mut Emitter, s: &mut Emitter) {
    let compound = &message.compound;
    let class = compound.class_name().to_string();
    let base_cpp = message
        .base
        .as_deref()
        .map(|base| ctx.cpp_ref(base))
        .unwrap_or_else(|| "trc::Record".to_string());
    let all_fields = ctx.flatten_fields(message);
    let own = &compound.fields;
    let dtor = needs_dtor(own);

    h.blank();
    h.line(&format!("class {} : public {} {{", class, base_cpp));
    h.line("public:");
    h.indent();

    for nested in &compound.nested {
        gen_nested(ctx, nested, &format!("{}::", class), h, s);
    }

    h.line(&format!("{}();", class));
    if dtor {
        h.line(&format!("virtual ~{}();", class));
    }
    h.blank();
    gen_tag_enum(own, h);

    h.line("static uint64_t staticId();");
    h.line("static int staticVersion();");
    h.line("static const char* staticName();");
    h.line("virtual uint64_t getId() const;");
    h.line("virtual int getVersion() const;");
    h.line("virtual const char* getName() const;");
    h.blank();

    for field in own {
        gen_accessors(ctx, field, h);
    }

    h.line("virtual void save(trc::Writer& out) const;");
    h.line("virtual bool load(trc::Reader& in);");
    h.line("virtual void dump(std::ostream& out, int level) const;");
    h.dedent();
    h.blank();
    h.line("protected:");
    h.indent();
    for field in own {
        gen_storage(ctx, field, h);
    }
    h.dedent();
    if dtor {
        h.blank();
        h.line("private:");
        h.indent();
        h.line(&format!("{}(const {}&);", class, class));
        h.line(&format!("{}& operator=(const {}&);", class, class));
        h.dedent();
    }
    h.line("};");

    gen_ctor_source(ctx, compound, &class, s);
    if dtor {
        gen_dtor_source(compound, &class, s);
    }
    gen_identity_source(message, &class, s);
    gen_save_source(ctx, &class, &all_fields, s);
    gen_load_source(ctx, &class, &all_fields, s);
    gen_dump_source(ctx, &class, compound.name.as_str(), &all_fields, s);
}

fn gen_nested(ctx: &GenCtx, decl: &Decl, qual: &str, h: &mut Emitter, s: &mut Emitter) {
    match decl {
        Decl::Group(group) => gen_group(ctx, group, qual, h, s),
        Decl::Bitset(bitset) => gen_bitset(bitset, qual, h, s),
        Decl::Enum(decl) => gen_enum(decl, h),
    }
}

fn gen_group(ctx: &GenCtx, group: &Compound, qual: &str, h: &mut Emitter, s: &mut Emitter) {
    let class = group.class_name().to_string();
    let path = format!("{}{}", qual, class);
    let dtor = needs_dtor(&group.fields);
    let fields: Vec<&FieldDecl> = group.fields.iter().collect();

    h.line(&format!("class {} {{", class));
    h.line("public:");
    h.indent();

    for nested in &group.nested {
        gen_nested(ctx, nested, &format!("{}::", path), h, s);
    }

    h.line(&format!("{}();", class));
    if dtor {
        h.line(&format!("~{}();", class));
    }
    h.blank();
    gen_tag_enum(&group.fields, h);

    for field in &group.fields {
        gen_accessors(ctx, field, h);
    }

    h.line("void save(trc::Writer& out) const;");
    h.line("bool load(trc::Reader& in);");
    h.line("void dump(std::ostream& out, int level) const;");
    h.dedent();
    h.blank();
    h.line("private:");
    h.indent();
    for field in &group.fields {
        gen_storage(ctx, field, h);
    }
    if dtor {
        h.blank();
        h.line(&format!("{}(const {}&);", class, class));
        h.line(&format!("{}& operator=(const {}&);", class, class));
    }
    h.dedent();
    h.line("};");
    h.blank();

    gen_ctor_source(ctx, group, &path, s);
    if dtor {
        gen_dtor_source(group, &path, s);
    }
    gen_save_source(ctx, &path, &fields, s);
    gen_load_source(ctx, &path, &fields, s);
    gen_dump_source(ctx, &path, group.name.as_str(), &fields, s);
}

fn gen_bitset(bitset: &Compound, qual: &str, h: &mut Emitter, s: &mut Emitter) {
    let class = bitset.class_name().to_string();
    let path = format!("{}{}", qual, class);
    let default_word = bitset_default_word(bitset);

    h.line(&format!("class {} {{", class));
    h.line("public:");
    h.indent();
    h.line(&format!("{}();", class));
    h.blank();
    h.line(&format!(
        "static const uint32_t DEFAULT_BITS = 0x{:08X}u;",
        default_word
    ));
    h.blank();
    for (i, field) in bitset.fields.iter().enumerate() {
        let mask = format!("0x{:08X}u", 1u32 << i);
        let getter = escape_cpp_keyword(&field.name);
        let default_on = matches!(field.default, Some(Literal::Bool(true)));
        h.line(&format!(
            "bool {}() const {{ return (m_bits & {}) != 0; }}",
            getter, mask
        ));
        h.line(&format!(
            "void set_{}(bool value) {{ if (value) {{ m_bits |= {}; }} else {{ m_bits &= ~{}; }} }}",
            field.name, mask, mask
        ));
        h.line(&format!(
            "void clear_{}() {{ set_{}({}); }}",
            field.name,
            field.name,
            if default_on { "true" } else { "false" }
        ));
    }
    h.blank();
    h.line("uint32_t word() const { return m_bits; }");
    h.line("void setWord(uint32_t value) { m_bits = value; }");
    h.blank();
    h.line("void save(trc::Writer& out) const;");
    h.line("void load(trc::Reader& in);");
    h.line("void dump(std::ostream& out, int level) const;");
    h.dedent();
    h.blank();
    h.line("private:");
    h.indent();
    h.line("uint32_t m_bits;");
    h.dedent();
    h.line("};");
    h.blank();

    s.blank();
    s.line(&format!("{}::{}()", path, class));
    s.line("    : m_bits(DEFAULT_BITS)");
    s.open("{");
    s.close("}");

    s.blank();
    s.open(&format!("void {}::save(trc::Writer& out) const {{", path));
    s.line("out.writeUInt32(m_bits);");
    s.close("}");

    s.blank();
    s.open(&format!("void {}::load(trc::Reader& in) {{", path));
    s.line("m_bits = in.readUInt32();");
    s.close("}");

    s.blank();
    s.open(&format!(
        "void {}::dump(std::ostream& out, int level) const {{",
        path
    ));
    s.line(&format!(
        "out << trc::Indent(level) << \"{} {{\\n\";",
        bitset.name
    ));
    for field in &bitset.fields {
        let getter = escape_cpp_keyword(&field.name);
        s.line(&format!(
            "out << trc::Indent(level + 1) << \"{} = \" << ({}() ? \"true\" : \"false\") << \"\\n\";",
            field.name, getter
        ));
    }
    s.line("out << trc::Indent(level) << \"}\\n\";");
    s.close("}");
}

fn gen_enum(decl: &crate::types::EnumDecl, h: &mut Emitter) {
    h.open(&format!("enum {} {{", decl.name));
    for (i, (name, value)) in decl.values.iter().enumerate() {
        let comma = if i + 1 < decl.values.len() { "," } else { "" };
        h.line(&format!("{} = {}{}", name, value, comma));
    }
    h.close("};");
    h.blank();
}

fn gen_tag_enum(fields: &[FieldDecl], h: &mut Emitter) {
    if fields.is_empty() {
        return;
    }
    h.open("enum {");
    for (i, field) in fields.iter().enumerate() {
        let comma = if i + 1 < fields.len() { "," } else { "" };
        h.line(&format!("TAG_{} = {}{}", field.name, field.tag, comma));
    }
    h.close("};");
    h.blank();
}

fn gen_accessors(ctx: &GenCtx, field: &FieldDecl, h: &mut Emitter) {
    let name = &field.name;
    let getter = escape_cpp_keyword(name);
    h.line(&format!(
        "bool has_{}() const {{ return m_has_{}; }}",
        name, name
    ));
    match slot(ctx, field) {
        Slot::Value(simple) => {
            let cpp = simple.cpp_type();
            let resets = reset_statements(field, simple);
            h.line(&format!(
                "void clear_{}() {{ {} m_has_{} = false; }}",
                name,
                resets.join(" "),
                name
            ));
            if pass_by_ref(simple) {
                h.line(&format!(
                    "const {}& {}() const {{ return m_{}; }}",
                    cpp, getter, name
                ));
                h.line(&format!(
                    "void set_{}(const {}& value) {{ m_{} = value; m_has_{} = true; }}",
                    name, cpp, name, name
                ));
            } else {
                h.line(&format!("{} {}() const {{ return m_{}; }}", cpp, getter, name));
                h.line(&format!(
                    "void set_{}({} value) {{ m_{} = value; m_has_{} = true; }}",
                    name, cpp, name, name
                ));
            }
        }
        Slot::ValueArray(simple) => {
            let cpp = simple.cpp_type();
            h.line(&format!(
                "void clear_{}() {{ m_{}.clear(); m_has_{} = false; }}",
                name, name, name
            ));
            h.line(&format!(
                "const std::vector<{}>& {}() const {{ return m_{}; }}",
                cpp, getter, name
            ));
            h.line(&format!(
                "std::vector<{}>& set_{}() {{ m_has_{} = true; return m_{}; }}",
                cpp, name, name, name
            ));
        }
        Slot::Owned(cpp) => {
            h.line(&format!(
                "void clear_{}() {{ delete m_{}; m_{} = 0; m_has_{} = false; }}",
                name, name, name, name
            ));
            h.line(&format!(
                "const {}& {}() const {{ return *m_{}; }}",
                cpp, getter, name
            ));
            h.open(&format!("{}& set_{}() {{", cpp, name));
            h.open(&format!("if (!m_{}) {{", name));
            h.line(&format!("m_{} = new {}();", name, cpp));
            h.close("}");
            h.line(&format!("m_has_{} = true;", name));
            h.line(&format!("return *m_{};", name));
            h.close("}");
        }
        Slot::Shared(cpp) => {
            h.line(&format!(
                "void clear_{}() {{ m_{} = trc::Shared<{}>(); m_has_{} = false; }}",
                name, name, cpp, name
            ));
            h.line(&format!(
                "const trc::Shared<{}>& {}() const {{ return m_{}; }}",
                cpp, getter, name
            ));
            h.open(&format!("{}& set_{}() {{", cpp, name));
            h.open(&format!("if (!m_{}) {{", name));
            h.line(&format!("m_{} = trc::Shared<{}>(new {}());", name, cpp, cpp));
            h.close("}");
            h.line(&format!("m_has_{} = true;", name));
            h.line(&format!("return *m_{};", name));
            h.close("}");
            h.line(&format!(
                "void set_{}(const trc::Shared<{}>& value) {{ m_{} = value; m_has_{} = true; }}",
                name, cpp, name, name
            ));
        }
        Slot::OwnedArray(cpp) => {
            h.open(&format!("void clear_{}() {{", name));
            h.open(&format!("if (m_{}) {{", name));
            h.open(&format!("for (size_t i = 0; i < m_{}->size(); ++i) {{", name));
            h.line(&format!("delete (*m_{})[i];", name));
            h.close("}");
            h.line(&format!("delete m_{};", name));
            h.line(&format!("m_{} = 0;", name));
            h.close("}");
            h.line(&format!("m_has_{} = false;", name));
            h.close("}");
            h.line(&format!(
                "const std::vector<{}*>& {}() const {{ return *m_{}; }}",
                cpp, getter, name
            ));
            h.open(&format!("std::vector<{}*>& set_{}() {{", cpp, name));
            h.open(&format!("if (!m_{}) {{", name));
            h.line(&format!("m_{} = new std::vector<{}*>();", name, cpp));
            h.close("}");
            h.line(&format!("m_has_{} = true;", name));
            h.line(&format!("return *m_{};", name));
            h.close("}");
            h.open(&format!("{}& add_{}() {{", cpp, name));
            h.line(&format!("set_{}().push_back(new {}());", name, cpp));
            h.line(&format!("return *m_{}->back();", name));
            h.close("}");
        }
        Slot::SharedArray(cpp) => {
            h.line(&format!(
                "void clear_{}() {{ delete m_{}; m_{} = 0; m_has_{} = false; }}",
                name, name, name, name
            ));
            h.line(&format!(
                "const std::vector<trc::Shared<{}>>& {}() const {{ return *m_{}; }}",
                cpp, getter, name
            ));
            h.open(&format!(
                "std::vector<trc::Shared<{}>>& set_{}() {{",
                cpp, name
            ));
            h.open(&format!("if (!m_{}) {{", name));
            h.line(&format!(
                "m_{} = new std::vector<trc::Shared<{}>>();",
                name, cpp
            ));
            h.close("}");
            h.line(&format!("m_has_{} = true;", name));
            h.line(&format!("return *m_{};", name));
            h.close("}");
            h.open(&format!("{}& add_{}() {{", cpp, name));
            h.line(&format!(
                "set_{}().push_back(trc::Shared<{}>(new {}()));",
                name, cpp, cpp
            ));
            h.line(&format!("return *m_{}->back();", name));
            h.close("}");
        }
    }
    h.blank();
}

fn gen_storage(ctx: &GenCtx, field: &FieldDecl, h: &mut Emitter) {
    let name = &field.name;
    match slot(ctx, field) {
        Slot::Value(simple) => h.line(&format!("{} m_{};", simple.cpp_type(), name)),
        Slot::ValueArray(simple) => {
            h.line(&format!("std::vector<{}> m_{};", simple.cpp_type(), name))
        }
        Slot::Owned(cpp) => h.line(&format!("{}* m_{};", cpp, name)),
        Slot::Shared(cpp) => h.line(&format!("trc::Shared<{}> m_{};", cpp, name)),
        Slot::OwnedArray(cpp) => h.line(&format!("std::vector<{}*>* m_{};", cpp, name)),
        Slot::SharedArray(cpp) => {
            h.line(&format!("std::vector<trc::Shared<{}>>* m_{};", cpp, name))
        }
    }
    h.line(&format!("bool m_has_{};", name));
}

fn gen_ctor_source(ctx: &GenCtx, compound: &Compound, path: &str, s: &mut Emitter) {
    let class = compound.class_name();
    let mut initializers = Vec::new();
    let mut body = Vec::new();
    for field in &compound.fields {
        let name = &field.name;
        match slot(ctx, field) {
            Slot::Value(simple) => {
                if simple == SimpleType::Curve {
                    body.extend(curve_setup(name, field.default.as_ref()));
                } else if let Some(expr) = default_expr(field, simple) {
                    initializers.push(format!("m_{}({})", name, expr));
                }
            }
            Slot::ValueArray(_) | Slot::Shared(_) => {}
            Slot::Owned(_) | Slot::OwnedArray(_) | Slot::SharedArray(_) => {
                initializers.push(format!("m_{}(0)", name));
            }
        }
        initializers.push(format!("m_has_{}(false)", name));
    }

    s.blank();
    s.line(&format!("{}::{}()", path, class));
    for (i, init) in initializers.iter().enumerate() {
        let lead = if i == 0 { ":" } else { "," };
        s.line(&format!("    {} {}", lead, init));
    }
    s.open("{");
    for line in body {
        s.line(&line);
    }
    s.close("}");
}

fn gen_dtor_source(compound: &Compound, path: &str, s: &mut Emitter) {
    let class = compound.class_name();
    s.blank();
    s.open(&format!("{}::~{}() {{", path, class));
    for field in &compound.fields {
        let name = &field.name;
        match slot_kind(field) {
            SlotKind::Owned => s.line(&format!("delete m_{};", name)),
            SlotKind::OwnedArray => s.line(&format!("clear_{}();", name)),
            SlotKind::SharedArray => s.line(&format!("delete m_{};", name)),
            _ => {}
        }
    }
    s.close("}");
}

fn gen_identity_source(message: &MessageDecl, path: &str, s: &mut Emitter) {
    let id = identity_value(message.identity);
    s.blank();
    s.open(&format!("uint64_t {}::staticId() {{", path));
    s.line(&format!(
        "return 0x{:016X}ull; // {}_{}",
        id, message.compound.name, message.version
    ));
    s.close("}");
    s.blank();
    s.open(&format!("int {}::staticVersion() {{", path));
    s.line(&format!("return {};", message.version));
    s.close("}");
    s.blank();
    s.open(&format!("const char* {}::staticName() {{", path));
    s.line(&format!("return \"{}\";", message.compound.name));
    s.close("}");
    s.blank();
    s.open(&format!("uint64_t {}::getId() const {{", path));
    s.line("return staticId();");
    s.close("}");
    s.blank();
    s.open(&format!("int {}::getVersion() const {{", path));
    s.line("return staticVersion();");
    s.close("}");
    s.blank();
    s.open(&format!("const char* {}::getName() const {{", path));
    s.line("return staticName();");
    s.close("}");
}

fn gen_save_source(ctx: &GenCtx, path: &str, fields: &[&FieldDecl], s: &mut Emitter) {
    s.blank();
    s.open(&format!("void {}::save(trc::Writer& out) const {{", path));
    s.line("out.beginCompound();");
    for field in fields {
        if field.deprecated {
            continue;
        }
        let name = &field.name;
        s.open(&format!("if (m_has_{}) {{", name));
        s.line(&format!("out.writeTag(TAG_{});", name));
        match slot(ctx, field) {
            Slot::Value(simple) => {
                s.line(&format!(
                    "out.write{}(m_{});",
                    simple.stream_suffix(),
                    name
                ));
            }
            Slot::ValueArray(simple) => {
                s.line(&format!("out.writeUInt32((uint32_t)m_{}.size());", name));
                s.open(&format!("for (size_t i = 0; i < m_{}.size(); ++i) {{", name));
                s.line(&format!(
                    "out.write{}(m_{}[i]);",
                    simple.stream_suffix(),
                    name
                ));
                s.close("}");
            }
            Slot::Owned(_) | Slot::Shared(_) => {
                s.line(&format!("m_{}->save(out);", name));
            }
            Slot::OwnedArray(_) | Slot::SharedArray(_) => {
                s.line(&format!("out.writeUInt32((uint32_t)m_{}->size());", name));
                s.open(&format!(
                    "for (size_t i = 0; i < m_{}->size(); ++i) {{",
                    name
                ));
                s.line(&format!("(*m_{})[i]->save(out);", name));
                s.close("}");
            }
        }
        s.close("}");
    }
    s.line("out.writeTag(0);");
    s.line("out.endCompound();");
    s.close("}");
}

fn gen_load_source(ctx: &GenCtx, path: &str, fields: &[&FieldDecl], s: &mut Emitter) {
    s.blank();
    s.open(&format!("bool {}::load(trc::Reader& in) {{", path));
    s.line("in.beginCompound();");
    s.open("for (;;) {");
    s.line("uint32_t tag = in.readTag();");
    s.open("if (tag == 0) {");
    s.line("break;");
    s.close("}");
    s.line("switch (tag) {");
    for field in fields {
        let name = &field.name;
        match slot(ctx, field) {
            Slot::Value(simple) => {
                s.open(&format!("case TAG_{}:", name));
                s.line(&format!("m_{} = in.read{}();", name, simple.stream_suffix()));
                s.line(&format!("m_has_{} = true;", name));
                s.line("break;");
                s.dedent();
            }
            Slot::ValueArray(simple) => {
                s.open(&format!("case TAG_{}: {{", name));
                s.line("uint32_t count = in.readUInt32();");
                s.line(&format!("m_{}.clear();", name));
                s.open("for (uint32_t i = 0; i < count; ++i) {");
                s.line(&format!(
                    "m_{}.push_back(in.read{}());",
                    name,
                    simple.stream_suffix()
                ));
                s.close("}");
                s.line(&format!("m_has_{} = true;", name));
                s.line("break;");
                s.close("}");
            }
            Slot::Owned(cpp) => {
                s.open(&format!("case TAG_{}:", name));
                s.open(&format!("if (!m_{}) {{", name));
                s.line(&format!("m_{} = new {}();", name, cpp));
                s.close("}");
                s.line(&format!("m_{}->load(in);", name));
                s.line(&format!("m_has_{} = true;", name));
                s.line("break;");
                s.dedent();
            }
            Slot::Shared(cpp) => {
                s.open(&format!("case TAG_{}:", name));
                s.open(&format!("if (!m_{}) {{", name));
                s.line(&format!(
                    "m_{} = trc::Shared<{}>(new {}());",
                    name, cpp, cpp
                ));
                s.close("}");
                s.line(&format!("m_{}->load(in);", name));
                s.line(&format!("m_has_{} = true;", name));
                s.line("break;");
                s.dedent();
            }
            Slot::OwnedArray(cpp) => {
                s.open(&format!("case TAG_{}: {{", name));
                s.line("uint32_t count = in.readUInt32();");
                s.line(&format!("clear_{}();", name));
                s.line(&format!("m_{} = new std::vector<{}*>();", name, cpp));
                s.open("for (uint32_t i = 0; i < count; ++i) {");
                s.line(&format!("{}* element = new {}();", cpp, cpp));
                s.line("element->load(in);");
                s.line(&format!("m_{}->push_back(element);", name));
                s.close("}");
                s.line(&format!("m_has_{} = true;", name));
                s.line("break;");
                s.close("}");
            }
            Slot::SharedArray(cpp) => {
                s.open(&format!("case TAG_{}: {{", name));
                s.line("uint32_t count = in.readUInt32();");
                s.line(&format!("clear_{}();", name));
                s.line(&format!(
                    "m_{} = new std::vector<trc::Shared<{}>>();",
                    name, cpp
                ));
                s.open("for (uint32_t i = 0; i < count; ++i) {");
                s.line(&format!("trc::Shared<{}> element(new {}());", cpp, cpp));
                s.line("element->load(in);");
                s.line(&format!("m_{}->push_back(element);", name));
                s.close("}");
                s.line(&format!("m_has_{} = true;", name));
                s.line("break;");
                s.close("}");
            }
        }
    }
    s.open("default:");
    s.line("in.skipValue();");
    s.line("break;");
    s.dedent();
    s.line("}");
    s.close("}");
    s.line("in.endCompound();");
    for field in fields {
        if field.required {
            s.open(&format!("if (!m_has_{}) {{", field.name));
            s.line("return false;");
            s.close("}");
        }
    }
    s.line("return true;");
    s.close("}");
}

fn gen_dump_source(
    ctx: &GenCtx,
    path: &str,
    display_name: &str,
    fields: &[&FieldDecl],
    s: &mut Emitter,
) {
    s.blank();
    s.open(&format!(
        "void {}::dump(std::ostream& out, int level) const {{",
        path
    ));
    s.line(&format!(
        "out << trc::Indent(level) << \"{} {{\\n\";",
        display_name
    ));
    for field in fields {
        let name = &field.name;
        s.open(&format!("if (m_has_{}) {{", name));
        match slot(ctx, field) {
            Slot::Value(simple) => {
                s.line(&format!(
                    "out << trc::Indent(level + 1) << \"{} = \" << {} << \"\\n\";",
                    name,
                    dump_expr(simple, &format!("m_{}", name))
                ));
            }
            Slot::ValueArray(simple) => {
                s.line(&format!(
                    "out << trc::Indent(level + 1) << \"{} = [\\n\";",
                    name
                ));
                s.open(&format!("for (size_t i = 0; i < m_{}.size(); ++i) {{", name));
                s.line(&format!(
                    "out << trc::Indent(level + 2) << {} << \"\\n\";",
                    dump_expr(simple, &format!("m_{}[i]", name))
                ));
                s.close("}");
                s.line("out << trc::Indent(level + 1) << \"]\\n\";");
            }
            Slot::Owned(_) | Slot::Shared(_) => {
                s.line(&format!(
                    "out << trc::Indent(level + 1) << \"{} =\\n\";",
                    name
                ));
                s.line(&format!("m_{}->dump(out, level + 2);", name));
            }
            Slot::OwnedArray(_) | Slot::SharedArray(_) => {
                s.line(&format!(
                    "out << trc::Indent(level + 1) << \"{} = [\\n\";",
                    name
                ));
                s.open(&format!(
                    "for (size_t i = 0; i < m_{}->size(); ++i) {{",
                    name
                ));
                s.line(&format!("(*m_{})[i]->dump(out, level + 2);", name));
                s.close("}");
                s.line("out << trc::Indent(level + 1) << \"]\\n\";");
            }
        }
        s.close("}");
    }
    s.line("out << trc::Indent(level) << \"}\\n\";");
    s.close("}");
}

fn dump_expr(simple: SimpleType, member: &str) -> String {
    match simple {
        SimpleType::Bool => format!("({} ? \"true\" : \"false\")", member),
        SimpleType::Int8 | SimpleType::UInt8 => format!("(int){}", member),
        SimpleType::Str => format!("\"\\\"\" << {} << \"\\\"\"", member),
        _ => member.to_string(),
    }
}

fn pass_by_ref(simple: SimpleType) -> bool {
    matches!(
        simple,
        SimpleType::Str
            | SimpleType::Vec3
            | SimpleType::Quat
            | SimpleType::Curve
            | SimpleType::Path
            | SimpleType::Key
            | SimpleType::Date
    )
}

/// Initializer expression for a value field, or `None` when the default
/// constructor already produces the declared default.
fn default_expr(field: &FieldDecl, simple: SimpleType) -> Option<String> {
    let default = field.default.as_ref();
    match simple {
        SimpleType::Bool => Some(
            match default {
                Some(Literal::Bool(true)) => "true",
                _ => "false",
            }
            .to_string(),
        ),
        SimpleType::Int8
        | SimpleType::Int16
        | SimpleType::Int32
        | SimpleType::Int64
        | SimpleType::UInt8
        | SimpleType::UInt16
        | SimpleType::UInt32
        | SimpleType::UInt64 => {
            let value = match default {
                Some(Literal::Int(value)) => *value,
                _ => 0,
            };
            Some(int_literal(simple, value))
        }
        SimpleType::Float => Some(match default {
            Some(literal) => number_literal(literal, false),
            None => "0.0f".to_string(),
        }),
        SimpleType::Double => Some(match default {
            Some(literal) => number_literal(literal, true),
            None => "0.0".to_string(),
        }),
        SimpleType::Str => default.and_then(|literal| match literal {
            Literal::Str(text) => Some(format!("\"{}\"", text)),
            _ => None,
        }),
        SimpleType::Path | SimpleType::Key | SimpleType::Date => {
            default.and_then(|literal| match literal {
                Literal::Str(text) => {
                    Some(format!("{}(\"{}\")", simple.cpp_type(), text))
                }
                _ => None,
            })
        }
        SimpleType::Vec3 | SimpleType::Quat => {
            let components = match default {
                Some(Literal::Brace(elems)) => elems
                    .iter()
                    .map(|elem| number_literal(&elem.first, false))
                    .collect::<Vec<_>>(),
                _ if simple == SimpleType::Vec3 => {
                    vec!["0.0f".into(), "0.0f".into(), "0.0f".into()]
                }
                _ => vec!["0.0f".into(), "0.0f".into(), "0.0f".into(), "1.0f".into()],
            };
            Some(format!("{}({})", simple.cpp_type(), components.join(", ")))
        }
        SimpleType::Curve => None,
    }
}

/// Constructor-body statements restoring a curve's declared breakpoints.
fn curve_setup(name: &str, default: Option<&Literal>) -> Vec<String> {
    let mut lines = Vec::new();
    if let Some(Literal::Brace(elems)) = default {
        for elem in elems {
            if let Some(second) = &elem.second {
                lines.push(format!(
                    "m_{}.add({}, {});",
                    name,
                    number_literal(&elem.first, false),
                    number_literal(second, false)
                ));
            }
        }
    }
    lines
}

/// Statements a `clear_x()` runs to restore the declared default, presence
/// bit excluded.
fn reset_statements(field: &FieldDecl, simple: SimpleType) -> Vec<String> {
    let name = &field.name;
    match simple {
        SimpleType::Curve => {
            let mut lines = vec![format!("m_{} = trc::Curve();", name)];
            lines.extend(curve_setup(name, field.default.as_ref()));
            lines
        }
        _ => match default_expr(field, simple) {
            Some(expr) => vec![format!("m_{} = {};", name, expr)],
            None => vec![format!("m_{} = {}();", name, simple.cpp_type())],
        },
    }
}

fn int_literal(simple: SimpleType, value: i64) -> String {
    match simple {
        SimpleType::Int64 => format!("{}ll", value),
        SimpleType::UInt64 => format!("{}ull", value),
        SimpleType::UInt8 | SimpleType::UInt16 | SimpleType::UInt32 => format!("{}u", value),
        _ => format!("{}", value),
    }
}

fn number_literal(literal: &Literal, double: bool) -> String {
    let text = match literal {
        Literal::Int(value) => format!("{}.0", value),
        Literal::Float(value) => {
            let text = format!("{}", value);
            if text.contains('.') || text.contains('e') {
                text
            } else {
                format!("{}.0", text)
            }
        }
        _ => "0.0".to_string(),
    };
    if double {
        text
    } else {
        format!("{}f", text)
    }
}

fn escape_cpp_keyword(name: &str) -> String {
    const KEYWORDS: &[&str] = &[
        "auto", "bool", "break", "case", "catch", "char", "class", "const", "continue",
        "default", "delete", "do", "double", "else", "enum", "explicit", "extern", "false",
        "float", "for", "friend", "goto", "if", "inline", "int", "long", "namespace", "new",
        "operator", "private", "protected", "public", "return", "short", "signed", "sizeof",
        "static", "struct", "switch", "template", "this", "throw", "true", "try", "typedef",
        "typename", "union", "unsigned", "using", "virtual", "void", "volatile", "while",
    ];
    if KEYWORDS.contains(&name) {
        format!("{}_", name)
    } else {
        name.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_guard_macro() {
        assert_eq!(guard_macro("sim/records.h"), "SIM_RECORDS_H");
        assert_eq!(guard_macro("Records.h"), "RECORDS_H");
    }

    #[test]
    fn test_escape_cpp_keyword() {
        assert_eq!(escape_cpp_keyword("class"), "class_");
        assert_eq!(escape_cpp_keyword("position"), "position");
    }

    #[test]
    fn test_number_literal_forms() {
        assert_eq!(number_literal(&Literal::Float(1.5), false), "1.5f");
        assert_eq!(number_literal(&Literal::Int(2), true), "2.0");
        assert_eq!(number_literal(&Literal::Float(3.0), true), "3.0");
    }
}
