use cad_script::capability;

use crate::GenerationError;

const PREAMBLE: &str = r#"You are a CAD assistant that writes scripts in a small declarative modeling language.
Respond only with the script. Do not add explanations before or after it.

Language reference:
- Optional parameter block, first in the script:
  params {
    width = 10mm
  }
- Statements are `name = expression` or a bare shape expression.
- Numbers accept the units mm and deg; all lengths are millimeters.
- Expressions support + - * / and parentheses on numbers.
- `shape |> op(args)` is the same as `op(shape, args)`.
- Comments use // or /* */.
- Assign the finished part to `result`, e.g. `result = box(width, depth, 2mm)`.
- Shapes are centered on the origin with Z pointing up.

Available operations (nothing else exists):
"#;

const GUIDELINES: &str = r#"
Guidelines:
- If a measurement is not specified, make a sensible approximation.
- Put every dimension the user mentions in the params block.
- Produce one closed solid with positive volume.
"#;

/// System prompt describing the script language and every registered operation.
pub fn system_prompt() -> String {
    format!("{PREAMBLE}{}{GUIDELINES}", capability::catalog())
}

/// Pulls the script out of a chat reply.
///
/// The first fenced block wins, with or without a language tag; a reply with no
/// fence is taken whole.
pub fn extract_code(reply: &str) -> Result<String, GenerationError> {
    let code = match reply.find("```") {
        Some(start) => fenced_body(&reply[start + 3..]),
        None => reply,
    };
    let code = code.trim();
    if code.is_empty() {
        return Err(GenerationError::EmptyResponse);
    }
    Ok(code.to_string())
}

fn fenced_body(after_fence: &str) -> &str {
    let body = match after_fence.split_once('\n') {
        Some((tag, rest)) if is_language_tag(tag) => rest,
        _ => after_fence,
    };
    match body.find("```") {
        Some(end) => &body[..end],
        None => body,
    }
}

fn is_language_tag(line: &str) -> bool {
    line.trim()
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '+'))
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::{extract_code, system_prompt};
    use crate::GenerationError;

    #[test]
    fn system_prompt_covers_language_and_registry() {
        let prompt = system_prompt();
        assert!(prompt.contains("Respond only with the script"));
        assert!(prompt.contains("result = "));
        assert!(prompt.contains("millimeters"));
        assert!(prompt.contains("make a sensible approximation"));
        assert!(prompt.contains("- hole(shape, diameter):"));
        assert!(prompt.contains("- box(width, depth, height):"));
    }

    #[test]
    fn plain_reply_is_trimmed() {
        let code = extract_code("\n  result = sphere(5mm)\n\n").expect("code");
        assert_eq!(code, "result = sphere(5mm)");
    }

    #[test]
    fn first_fenced_block_wins() {
        let reply = "Sure! Here it is:\n```cad\nresult = box(1, 2, 3)\n```\nand another\n```\nresult = sphere(1)\n```";
        assert_eq!(extract_code(reply).expect("code"), "result = box(1, 2, 3)");
    }

    #[test]
    fn fence_without_tag_or_close() {
        assert_eq!(
            extract_code("```\nresult = sphere(2)\n").expect("code"),
            "result = sphere(2)"
        );
        assert_eq!(
            extract_code("```result = sphere(2)```").expect("code"),
            "result = sphere(2)"
        );
    }

    #[test]
    fn empty_reply_is_an_error() {
        assert!(matches!(
            extract_code("   \n"),
            Err(GenerationError::EmptyResponse)
        ));
        assert!(matches!(
            extract_code("```python\n```"),
            Err(GenerationError::EmptyResponse)
        ));
    }
}
