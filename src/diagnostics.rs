/// Render a caret diagnostic: the source line holding `offset`, a `^`
/// under the offending column, and the message.
pub fn render(source: &str, offset: usize, message: &str) -> String {
    let offset = offset.min(source.len());
    let line_start = source[..offset].rfind('\n').map_or(0, |i| i + 1);
    let line_end = source[offset..]
        .find('\n')
        .map_or(source.len(), |i| offset + i);
    let column = offset - line_start;

    format!(
        "{}\n{}^ {}",
        &source[line_start..line_end],
        " ".repeat(column),
        message
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_caret_points_at_the_offset() {
        let rendered = render("a = $;", 4, "invalid character '$'");

        assert_eq!(rendered, "a = $;\n    ^ invalid character '$'");
    }

    #[test]
    fn test_offset_at_end_of_input() {
        let rendered = render("main(){", 7, "Expected an expression");

        assert_eq!(rendered, "main(){\n       ^ Expected an expression");
    }

    #[test]
    fn test_offset_past_end_is_clamped() {
        let rendered = render("ab", 10, "oops");

        assert_eq!(rendered, "ab\n  ^ oops");
    }
}
