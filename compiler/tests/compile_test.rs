#![cfg(test)]

use trc_compiler::error::TrcError;
use trc_compiler::ident::{identity_value, message_identity};
use trc_compiler::types::{CompoundKind, Decl, FieldType, TopDecl};
use trc_compiler::{compile, parse_source};

const SCHEMA: &str = r#"
#header "sim/records.h"
#include "trc/runtime.h"

namespace Sim {

type Game::Object;

message Vehicle {
    @version = 2;

    required int32 id;
    float speed = 1.5;
    string name;
    vec3 position = { 1.0, 2.0, 3.0 };
    int32[] gears;

    group Wheel {
        float radius = 0.5;
        bool powered;
    }
    Wheel front;
    Wheel[] spares;

    bitset { bool lights; bool horn = true; } controls;

    enum { PARKED = 0, MOVING, BROKEN = 5 };

    Game::Object owner;
}

message Tank : Vehicle {
    @version = 1;
    deprecated float armor = 10.0;
    Vehicle escort;
}

}
"#;

#[test]
fn test_parse_schema_tree() {
    let schema = parse_source(SCHEMA).expect("parse failed");
    assert_eq!(schema.header.as_ref().unwrap().path, "sim/records.h");
    assert_eq!(schema.includes.len(), 1);
    assert_eq!(schema.includes[0].path, "trc/runtime.h");

    let decls = match &schema.decls[0] {
        TopDecl::Namespace { name, decls } => {
            assert_eq!(name, "Sim");
            decls
        }
        other => panic!("expected a namespace, got {:?}", other),
    };

    let vehicle = match &decls[0] {
        TopDecl::Message(message) => message,
        other => panic!("expected a message, got {:?}", other),
    };
    assert_eq!(vehicle.compound.name, "Vehicle");
    assert_eq!(vehicle.version, 2);
    assert_eq!(vehicle.identity, message_identity("Vehicle", 2));
    assert!(vehicle.base.is_none());

    // Tags are contiguous from 8 in declaration order, one per field.
    let names: Vec<&str> = vehicle
        .compound
        .fields
        .iter()
        .map(|field| field.name.as_str())
        .collect();
    assert_eq!(
        names,
        vec!["id", "speed", "name", "position", "gears", "front", "spares", "controls", "owner"]
    );
    for (i, field) in vehicle.compound.fields.iter().enumerate() {
        assert_eq!(field.tag, 8 + i as u32, "field {}", field.name);
    }
    assert!(vehicle.compound.fields[0].required);
    assert!(vehicle.compound.fields[4].is_array);

    // The inline bitset got a synthesized name and backs the `controls` field.
    let controls = &vehicle.compound.fields[7];
    assert_eq!(
        controls.ty,
        FieldType::Compound {
            name: "bitset1".to_string(),
            kind: CompoundKind::Bitset,
        }
    );
    let owner = &vehicle.compound.fields[8];
    assert_eq!(
        owner.ty,
        FieldType::Compound {
            name: "Game::Object".to_string(),
            kind: CompoundKind::External,
        }
    );

    // Nested declarations: the Wheel group, the bitset, the enum.
    assert_eq!(vehicle.compound.nested.len(), 3);
    assert!(matches!(&vehicle.compound.nested[0], Decl::Group(group) if group.name == "Wheel"));
    assert!(matches!(&vehicle.compound.nested[2], Decl::Enum(decl) if decl.values == vec![
        ("PARKED".to_string(), 0),
        ("MOVING".to_string(), 1),
        ("BROKEN".to_string(), 5),
    ]));

    // A derived message continues the tag sequence after its base.
    let tank = match &decls[1] {
        TopDecl::Message(message) => message,
        other => panic!("expected a message, got {:?}", other),
    };
    assert_eq!(tank.base.as_deref(), Some("Vehicle"));
    assert_eq!(tank.version, 1);
    assert_eq!(tank.compound.fields[0].name, "armor");
    assert_eq!(tank.compound.fields[0].tag, 17);
    assert!(tank.compound.fields[0].deprecated);
    assert_eq!(tank.compound.fields[1].tag, 18);
}

#[test]
fn test_generated_output_is_deterministic() {
    let first = compile(SCHEMA, "records.h").expect("compile failed");
    let second = compile(SCHEMA, "records.h").expect("compile failed");
    assert_eq!(first.header, second.header);
    assert_eq!(first.source, second.source);
}

#[test]
fn test_generated_header_shape() {
    let generated = compile(SCHEMA, "records.h").expect("compile failed");
    let header = &generated.header;

    assert!(header.starts_with("// Generated by trc. Do not edit.\n#ifndef SIM_RECORDS_H\n"));
    assert!(header.contains("#include \"trc/runtime.h\""));
    assert!(header.contains("namespace Sim {"));
    assert!(header.contains("class Vehicle : public trc::Record {"));
    assert!(header.contains("class Tank : public Sim::Vehicle {"));
    assert!(header.contains("TAG_id = 8,"));
    assert!(header.contains("TAG_speed = 9,"));
    assert!(header.contains("TAG_owner = 16"));
    // Tank's own tags continue after the base chain.
    assert!(header.contains("TAG_armor = 17,"));
    assert!(header.contains("TAG_escort = 18"));

    // Storage slots follow the ownership rules.
    assert!(header.contains("Sim::Vehicle::Wheel* m_front;"));
    assert!(header.contains("std::vector<Sim::Vehicle::Wheel*>* m_spares;"));
    assert!(header.contains("trc::Shared<Sim::Vehicle> m_escort;"));
    assert!(header.contains("Game::Object* m_owner;"));
    assert!(header.contains("bool m_has_id;"));

    // Presence and mutation surface.
    assert!(header.contains("bool has_speed() const { return m_has_speed; }"));
    assert!(header.contains("void clear_gears() { m_gears.clear(); m_has_gears = false; }"));
    assert!(header.contains("Sim::Vehicle::Wheel& add_spares() {"));

    // The inline bitset packs into one word with its aggregate default.
    assert!(header.contains("class bitset1 {"));
    assert!(header.contains("static const uint32_t DEFAULT_BITS = 0x00000002u;"));
    assert!(header.contains("bool horn() const { return (m_bits & 0x00000002u) != 0; }"));

    assert!(header.contains("enum enum1 {"));
    assert!(header.contains("BROKEN = 5"));
    assert!(header.trim_end().ends_with("#endif // SIM_RECORDS_H"));
}

#[test]
fn test_generated_source_shape() {
    let generated = compile(SCHEMA, "records.h").expect("compile failed");
    let source = &generated.source;

    assert!(source.starts_with("// Generated by trc. Do not edit.\n#include \"sim/records.h\"\n"));

    // Constructor restores declared defaults and clears every presence bit.
    assert!(source.contains("    : m_id(0)"));
    assert!(source.contains(", m_speed(1.5f)"));
    assert!(source.contains(", m_position(trc::Vec3(1.0f, 2.0f, 3.0f))"));
    assert!(source.contains(", m_has_speed(false)"));

    // Encode writes only present fields, tag first.
    assert!(source.contains("if (m_has_id) {"));
    assert!(source.contains("out.writeTag(TAG_id);"));
    assert!(source.contains("out.writeInt32(m_id);"));
    assert!(source.contains("out.writeTag(0);"));

    // Decode dispatches on tags, skips unknown ones, and enforces required
    // fields after the terminator.
    assert!(source.contains("case TAG_speed:"));
    assert!(source.contains("in.skipValue();"));
    assert!(source.contains("if (!m_has_id) {"));

    // Deprecated fields still decode but are no longer encoded.
    assert!(source.contains("case TAG_armor:"));
    assert!(!source.contains("out.writeTag(TAG_armor);"));

    // Identity accessors carry the hash of "<Name>_<version>".
    let id = identity_value(message_identity("Vehicle", 2));
    assert!(source.contains(&format!("return 0x{:016X}ull;", id)));
    assert!(source.contains("return \"Vehicle\";"));
    assert!(source.contains("int Vehicle::getVersion() const {"));

    // The packed bitset serializes as a single word.
    assert!(source.contains("void Vehicle::bitset1::save(trc::Writer& out) const {"));
    assert!(source.contains("out.writeUInt32(m_bits);"));
}

#[test]
fn test_worked_example() {
    let generated =
        compile("message Foo { required int32 x; float y = 1.5; }", "foo.h").expect("compile failed");
    assert!(generated.header.contains("TAG_x = 8,"));
    assert!(generated.header.contains("TAG_y = 9"));
    assert!(generated.source.contains("    : m_x(0)"));
    assert!(generated.source.contains(", m_y(1.5f)"));
    assert!(generated.source.contains("if (m_has_x) {"));
    assert!(generated.source.contains("if (m_has_y) {"));
    assert!(generated.source.contains("m_has_y = true;"));
}

#[test]
fn test_anonymous_bitsets_get_distinct_names() {
    let generated = compile(
        "message A { bitset { bool on; } one; bitset { bool off; } two; }",
        "a.h",
    )
    .expect("compile failed");
    assert!(generated.header.contains("class bitset1 {"));
    assert!(generated.header.contains("class bitset2 {"));
}

#[test]
fn test_version_changes_identity() {
    let one = message_identity("Foo", 1);
    let two = message_identity("Foo", 2);
    assert_ne!(one, two);
    let header_one = compile("message Foo { @version = 1; }", "f.h").unwrap();
    let header_two = compile("message Foo { @version = 2; }", "f.h").unwrap();
    assert!(header_one
        .source
        .contains(&format!("return 0x{:016X}ull;", identity_value(one))));
    assert!(header_two
        .source
        .contains(&format!("return 0x{:016X}ull;", identity_value(two))));
}

#[test]
fn test_bitset_rejects_non_bool_field() {
    let err = compile("message M { bitset { bool a; int32 b; } flags; }", "m.h").unwrap_err();
    match err {
        TrcError::Semantic { msg, .. } => assert!(msg.contains("must be bool"), "msg = {}", msg),
        other => panic!("expected a semantic error, got {:?}", other),
    }
}

#[test]
fn test_bitset_rejects_more_than_32_fields() {
    let mut body = String::new();
    for i in 0..33 {
        body.push_str(&format!("bool b{}; ", i));
    }
    let text = format!("message M {{ bitset {{ {} }} flags; }}", body);
    let err = compile(&text, "m.h").unwrap_err();
    match err {
        TrcError::Semantic { msg, .. } => {
            assert!(msg.contains("more than 32"), "msg = {}", msg)
        }
        other => panic!("expected a semantic error, got {:?}", other),
    }
}

#[test]
fn test_unknown_type_is_fatal() {
    let err = compile("message M { Widget w; }", "m.h").unwrap_err();
    match err {
        TrcError::Semantic { msg, line } => {
            assert!(msg.contains("unknown data type"), "msg = {}", msg);
            assert_eq!(line, 1);
        }
        other => panic!("expected a semantic error, got {:?}", other),
    }
}

#[test]
fn test_duplicate_field_name_is_fatal() {
    let err = compile("message M { int32 x; float x; }", "m.h").unwrap_err();
    assert!(matches!(err, TrcError::Semantic { .. }), "got {:?}", err);
}

#[test]
fn test_duplicate_inherited_field_is_fatal() {
    let err = compile(
        "message A { int32 x; } message B : A { float x; }",
        "m.h",
    )
    .unwrap_err();
    assert!(matches!(err, TrcError::Semantic { .. }), "got {:?}", err);
}

#[test]
fn test_non_integer_version_is_fatal() {
    let err = compile("message M { @version = 1.5; }", "m.h").unwrap_err();
    assert!(matches!(err, TrcError::Semantic { .. }), "got {:?}", err);
}

#[test]
fn test_syntax_error_reports_line_and_token() {
    let err = compile("message M {\n    int32 x\n}", "m.h").unwrap_err();
    match err {
        TrcError::Syntax { msg, line, .. } => {
            assert!(msg.contains("\";\""), "msg = {}", msg);
            assert_eq!(line, 3);
        }
        other => panic!("expected a syntax error, got {:?}", other),
    }
}

#[test]
fn test_storage_option_renames_class() {
    let generated = compile(
        "message Foo { @storage = FooRecord; int32 x; }",
        "f.h",
    )
    .expect("compile failed");
    assert!(generated.header.contains("class FooRecord : public trc::Record {"));
    // The wire name stays the schema name.
    assert!(generated.source.contains("return \"Foo\";"));
}
