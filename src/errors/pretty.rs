use super::Diagnostic;

pub fn underline(line: &str, column: usize) -> String {
    let mut marker = String::new();
    for ch in line.chars().take(column.saturating_sub(1)) {
        marker.push(if ch == '\t' { '\t' } else { ' ' });
    }
    marker.push('^');
    format!("{}\n{}", line, marker)
}

/// Renders `diagnostic` against the text it was reported on:
///
/// ```text
/// semantic error at line 2, column 5: Undefined variable 'y'
///   2 | var x: int = y;
///     |              ^
/// ```
pub fn render(source: &str, diagnostic: &Diagnostic) -> String {
    let mut out = diagnostic.to_string();
    let Some(text) = source.lines().nth(diagnostic.line.saturating_sub(1)) else {
        return out;
    };

    let gutter = diagnostic.line.to_string();
    let pad = " ".repeat(gutter.len());
    let underlined = underline(text, diagnostic.column);
    let mut parts = underlined.splitn(2, '\n');
    let code = parts.next().unwrap_or_default();
    let marker = parts.next().unwrap_or_default();

    out.push_str(&format!("\n {} | {}\n {} | {}", gutter, code, pad, marker));
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::Stage;

    #[test]
    fn caret_lands_under_column() {
        assert_eq!(underline("var x", 5), "var x\n    ^");
    }

    #[test]
    fn renders_gutter_and_caret() {
        let source = "fn int main() {\n  return y;\n}\n";
        let diagnostic = Diagnostic::new(Stage::Semantic, 2, 10, "Undefined variable 'y'");
        let rendered = render(source, &diagnostic);
        assert!(rendered.contains(" 2 |   return y;"));
        assert!(rendered.ends_with("   |          ^"));
    }

    #[test]
    fn out_of_range_line_renders_message_only() {
        let diagnostic = Diagnostic::new(Stage::Syntax, 9, 1, "expected '}'");
        assert_eq!(render("", &diagnostic), diagnostic.to_string());
    }
}
