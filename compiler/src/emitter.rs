/// Indentation-scoped text emitter for generated code. `open` and `close`
/// pair around nested blocks so the generator never counts spaces by hand.
#[derive(Debug, Default)]
pub struct Emitter {
    out:   String,
    depth: usize,
}

const INDENT: &str = "    ";

impl Emitter {
    pub fn new() -> Emitter {
        Emitter::default()
    }

    /// Emit one line at the current indent level.
    pub fn line(&mut self, text: &str) {
        if text.is_empty() {
            self.out.push('\n');
            return;
        }
        for _ in 0..self.depth {
            self.out.push_str(INDENT);
        }
        self.out.push_str(text);
        self.out.push('\n');
    }

    pub fn blank(&mut self) {
        self.out.push('\n');
    }

    /// Emit a line and indent everything that follows.
    pub fn open(&mut self, text: &str) {
        self.line(text);
        self.depth += 1;
    }

    /// Dedent, then emit the closing line.
    pub fn close(&mut self, text: &str) {
        self.depth = self.depth.saturating_sub(1);
        self.line(text);
    }

    pub fn indent(&mut self) {
        self.depth += 1;
    }

    pub fn dedent(&mut self) {
        self.depth = self.depth.saturating_sub(1);
    }

    pub fn finish(self) -> String {
        self.out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nesting() {
        let mut e = Emitter::new();
        e.open("class Foo {");
        e.line("int x;");
        e.open("void f() {");
        e.line("return;");
        e.close("}");
        e.close("};");
        assert_eq!(
            e.finish(),
            "class Foo {\n    int x;\n    void f() {\n        return;\n    }\n};\n"
        );
    }

    #[test]
    fn test_blank_lines_carry_no_indent() {
        let mut e = Emitter::new();
        e.open("{");
        e.blank();
        e.line("");
        e.close("}");
        assert_eq!(e.finish(), "{\n\n\n}\n");
    }
}
