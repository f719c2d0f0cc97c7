//! Unit tests for the code template

use std::panic::{catch_unwind, AssertUnwindSafe};

use crate::template::{reindent, TemplateBuffer, TemplateError, TemplateResult};

type Buffer = TemplateBuffer<&'static str>;

/// `void f() {` / editable body / `}`, wrapped in an extra range "fn"
fn function() -> Buffer {
    let mut buffer = Buffer::new();
    buffer
        .extra("fn", |t| {
            t.write_line("void f() {");
            t.indented(|t| t.write_editable_line("body", "// body"))?;
            t.write_line("}");
            Ok(())
        })
        .unwrap();
    buffer.write_line("");
    buffer.write_editable_line("tail", "// tail").unwrap();
    buffer
}

/// Every editable range's slice equals its recorded text
fn assert_consistent(buffer: &Buffer) {
    for (key, code) in buffer.code_for_editable_ranges() {
        let range = buffer.range_for_key(&key).unwrap();
        assert_eq!(&buffer.code()[range], code);
    }
}

#[test]
fn test_indentation_is_lazy() {
    let mut buffer = Buffer::new();
    buffer.indented(|t| t.write("a\n\nb"));
    assert_eq!(buffer.code(), "\ta\n\n\tb");
}

#[test]
fn test_custom_indent_string() {
    let mut buffer = Buffer::with_indent("  ");
    buffer.write_line("{");
    buffer.indented(|t| t.indented(|t| t.write_line("x")));
    buffer.write_line("}");
    assert_eq!(buffer.code(), "{\n    x\n}");
    assert_eq!(buffer.indent_string(), "  ");
}

#[test]
fn test_editable_range_excludes_indent() {
    let buffer = function();
    assert_eq!(buffer.code(), "void f() {\n\t// body\n}\n// tail");
    assert_eq!(buffer.code_for_key(&"body"), Some("// body"));
    assert_eq!(buffer.range_for_key(&"body"), Some(12..19));
    assert_eq!(buffer.editable_range(&"body").unwrap().indent_level, 1);
    assert_eq!(buffer.extra_range(&"fn"), Some(0..21));
}

#[test]
fn test_keys_in_order() {
    let buffer = function();
    let keys: Vec<_> = buffer.keys_in_order().copied().collect();
    assert_eq!(keys, ["body", "tail"]);
    assert!(buffer.contains_key(&"tail"));
    assert!(!buffer.contains_key(&"fn"));
}

#[test]
fn test_duplicate_key_rejected() {
    let mut buffer = Buffer::new();
    buffer.write_editable("k", "a").unwrap();
    let result = buffer.write_editable("k", "b");
    assert!(matches!(result, Err(TemplateError::DuplicateKey(_))));
    assert_eq!(buffer.editable_ranges().len(), 1);
}

#[test]
fn test_nested_editable_rejected() {
    let mut buffer = Buffer::new();
    let result = buffer.editable("outer", |t| t.write_editable("inner", "x"));
    assert!(matches!(result, Err(TemplateError::NestedRange(_))));
    assert!(buffer.editable_ranges().is_empty());

    // The buffer stays usable after the failed pass
    buffer.write_editable("again", "y").unwrap();
    assert_eq!(buffer.code_for_key(&"again"), Some("y"));
}

#[test]
fn test_indent_restored_on_error() {
    let mut buffer = Buffer::new();
    let result: TemplateResult<()> = buffer.indented(|t| {
        t.write_editable("k", "a")?;
        t.write_editable("k", "b")
    });
    assert!(result.is_err());
    assert_eq!(buffer.indent_level(), 0);
}

#[test]
fn test_indent_restored_on_panic() {
    let mut buffer = Buffer::new();
    let outcome = catch_unwind(AssertUnwindSafe(|| {
        buffer.indented(|_| panic!("generator bug"));
    }));
    assert!(outcome.is_err());
    assert_eq!(buffer.indent_level(), 0);
}

#[test]
fn test_editable_usable_after_panic() {
    let mut buffer = Buffer::new();
    let outcome = catch_unwind(AssertUnwindSafe(|| {
        let _ = buffer.editable("broken", |_| -> TemplateResult<()> {
            panic!("generator bug")
        });
    }));
    assert!(outcome.is_err());

    buffer.write_editable("next", "x").unwrap();
    assert_eq!(buffer.code_for_key(&"next"), Some("x"));
}

#[test]
fn test_set_code_shifts_later_ranges() {
    let mut buffer = function();
    buffer.set_code(&"body", "a();\n\tb();").unwrap();

    assert_eq!(buffer.code(), "void f() {\n\ta();\n\tb();\n}\n// tail");
    assert_eq!(buffer.code_for_key(&"body"), Some("a();\n\tb();"));
    assert_eq!(buffer.code_for_key(&"tail"), Some("// tail"));
    assert_eq!(buffer.extra_range(&"fn"), Some(0..24));
    assert_consistent(&buffer);
}

#[test]
fn test_set_code_can_shrink() {
    let mut buffer = function();
    buffer.set_code(&"body", "").unwrap();
    assert_eq!(buffer.code(), "void f() {\n\t\n}\n// tail");
    assert_eq!(buffer.range_for_key(&"body"), Some(12..12));
    assert_consistent(&buffer);
}

#[test]
fn test_set_code_moves_extra_after_empty_range() {
    let mut buffer = Buffer::new();
    buffer.write_editable("a", "").unwrap();
    buffer
        .extra("x", |t| {
            t.write("foo");
            Ok(())
        })
        .unwrap();

    buffer.set_code(&"a", "bar").unwrap();
    assert_eq!(buffer.code(), "barfoo");
    assert_eq!(buffer.extra_range(&"x"), Some(3..6));
    assert!(buffer.extra_keys_at(0).is_empty());
    assert_eq!(buffer.extra_keys_at(3), [&"x"]);
}

#[test]
fn test_set_code_grows_extra_ending_at_empty_range() {
    let mut buffer = Buffer::new();
    buffer
        .extra("x", |t| {
            t.write("if (");
            t.write_editable("cond", "")
        })
        .unwrap();
    buffer.write(") {}");

    buffer.set_code(&"cond", "ok").unwrap();
    assert_eq!(buffer.code(), "if (ok) {}");
    assert_eq!(buffer.extra_range(&"x"), Some(0..6));
}

#[test]
fn test_set_code_clamps_partly_overlapping_extras() {
    let mut buffer = Buffer::new();
    buffer.write("ab");
    buffer.write_editable("k", "cd").unwrap();
    buffer.write("ef");
    buffer.add_extra_range("left", 1..3).unwrap();
    buffer.add_extra_range("right", 3..6).unwrap();

    buffer.set_code(&"k", "").unwrap();
    assert_eq!(buffer.code(), "abef");
    assert_eq!(buffer.extra_range(&"left"), Some(1..2));
    assert_eq!(buffer.extra_range(&"right"), Some(2..4));
    assert_eq!(buffer.code_in_range(2..4), Some("ef"));
}

#[test]
fn test_set_code_unknown_key() {
    let mut buffer = function();
    assert!(matches!(
        buffer.set_code(&"missing", "x"),
        Err(TemplateError::UnknownKey(_))
    ));
}

#[test]
fn test_is_edited() {
    let mut buffer = function();
    assert!(!buffer.is_edited(&"body"));
    buffer.set_code(&"body", "go();").unwrap();
    assert!(buffer.is_edited(&"body"));
    buffer.set_code(&"body", "// body").unwrap();
    assert!(!buffer.is_edited(&"body"));
}

#[test]
fn test_offset_lookups() {
    let buffer = function();
    assert_eq!(buffer.editable_key_at(12), Some(&"body"));
    assert_eq!(buffer.editable_key_at(19), Some(&"body"));
    assert_eq!(buffer.editable_key_at(3), None);
    assert_eq!(buffer.next_editable(0), Some(&"body"));
    assert_eq!(buffer.next_editable(12), Some(&"tail"));
    assert_eq!(buffer.previous_editable(buffer.position()), Some(&"body"));
    assert_eq!(buffer.previous_editable(5), None);
}

#[test]
fn test_extra_keys_innermost_first() {
    let mut buffer = Buffer::new();
    buffer
        .extra("outer", |t| {
            t.write("ab");
            t.extra("inner", |t| {
                t.write("cd");
                Ok(())
            })
        })
        .unwrap();
    assert_eq!(buffer.extra_keys_at(2), [&"inner", &"outer"]);
    assert_eq!(buffer.extra_keys_at(0), [&"outer"]);
    assert!(buffer.extra_keys_at(4).is_empty());
}

#[test]
fn test_extra_range_replaced_and_bounded() {
    let mut buffer = Buffer::new();
    buffer.write("hello");
    buffer.add_extra_range("x", 0..2).unwrap();
    buffer.add_extra_range("x", 1..5).unwrap();
    assert_eq!(buffer.extra_ranges().len(), 1);
    assert_eq!(buffer.extra_range(&"x"), Some(1..5));
    assert!(matches!(
        buffer.add_extra_range("y", 3..9),
        Err(TemplateError::OutOfBounds { len: 5, .. })
    ));
}

#[test]
fn test_reindent() {
    assert_eq!(reindent("x\n\ty", 1, 2, "\t"), "x\n\t\ty");
    assert_eq!(reindent("x\n\t\ty", 2, 1, "\t"), "x\n\ty");
    assert_eq!(reindent("x\n\ny", 0, 1, "\t"), "x\n\n\ty");
    assert_eq!(reindent("single", 0, 3, "\t"), "single");
}

#[test]
fn test_serde_roundtrip() {
    let mut buffer: TemplateBuffer<String> = TemplateBuffer::new();
    buffer.write_line("int x;");
    buffer.write_editable_line("k".to_string(), "// k").unwrap();
    buffer.set_code(&"k".to_string(), "x = 1;").unwrap();

    let json = serde_json::to_string(&buffer).unwrap();
    let restored: TemplateBuffer<String> = serde_json::from_str(&json).unwrap();
    assert_eq!(restored.code(), buffer.code());
    assert_eq!(restored.editable_ranges(), buffer.editable_ranges());
    assert!(restored.is_edited(&"k".to_string()));
}
