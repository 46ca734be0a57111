//! Result cards: one embed per page of captured output.

use chrono::{DateTime, Utc};

use crate::types::Embed;

use super::capture::CapturedOutput;
use super::paginate::Paginator;

pub const SUCCESS_COLOR: u32 = 0x58EF92;
pub const FAILURE_COLOR: u32 = 0xE74C3C;

/// First line of every result, naming the interpreter and the platform.
pub fn header_line() -> String {
    format!(
        "*** Rhai - yami {} - {}/{}",
        env!("CARGO_PKG_VERSION"),
        std::env::consts::OS,
        std::env::consts::ARCH
    )
}

/// Render `output` as result cards stamped with the current time.
pub fn render_cards(
    output: &CapturedOutput,
    icon_url: Option<String>,
    max_lines: usize,
    max_chars: usize,
) -> Vec<Embed> {
    render_cards_at(output, icon_url, max_lines, max_chars, Utc::now())
}

/// Paginate first so every footer can carry the final page count.
pub fn render_cards_at(
    output: &CapturedOutput,
    icon_url: Option<String>,
    max_lines: usize,
    max_chars: usize,
    now: DateTime<Utc>,
) -> Vec<Embed> {
    let text = format!("{}\n{}", header_line(), output.text);
    let pages = Paginator::new(text, max_lines, max_chars).build_pages();
    let total = pages.len();

    let color = if output.status.is_success() {
        SUCCESS_COLOR
    } else {
        FAILURE_COLOR
    };
    let title = format!("Executed in {:.2}ms", output.elapsed_ms());
    let timestamp = now.to_rfc3339();

    pages
        .into_iter()
        .map(|page| {
            Embed::new()
                .title(title.clone())
                .description(format!("Result: ```diff\n{}```", page.content))
                .color(color)
                .timestamp(timestamp.clone())
                .footer(format!("{}/{}", page.index, total), icon_url.clone())
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::eval::capture::CaptureStatus;
    use std::time::Duration;

    fn output(text: &str, status: CaptureStatus) -> CapturedOutput {
        CapturedOutput {
            text: text.to_string(),
            elapsed: Duration::from_micros(1500),
            status,
        }
    }

    #[test]
    fn single_page_card() {
        let cards = render_cards(
            &output("- Returned 2\n", CaptureStatus::Succeeded),
            Some("https://cdn/a.png".to_string()),
            27,
            1048,
        );
        assert_eq!(cards.len(), 1);
        let card = &cards[0];
        assert_eq!(card.title.as_deref(), Some("Executed in 1.50ms"));
        assert_eq!(card.color, Some(SUCCESS_COLOR));
        let description = card.description.as_deref().unwrap();
        assert!(description.starts_with("Result: ```diff\n*** Rhai - yami "));
        assert!(description.ends_with("- Returned 2\n```"));
        let footer = card.footer.as_ref().unwrap();
        assert_eq!(footer.text, "1/1");
        assert_eq!(footer.icon_url.as_deref(), Some("https://cdn/a.png"));
    }

    #[test]
    fn failure_uses_failure_color() {
        let cards = render_cards(&output("boom\n", CaptureStatus::Failed), None, 27, 1048);
        assert_eq!(cards[0].color, Some(FAILURE_COLOR));
        let cards = render_cards(&output("", CaptureStatus::Exited(Some(1))), None, 27, 1048);
        assert_eq!(cards[0].color, Some(FAILURE_COLOR));
    }

    #[test]
    fn footers_carry_total() {
        let text: String = (0..60).map(|i| format!("line {i}\n")).collect();
        let cards = render_cards(&output(&text, CaptureStatus::Succeeded), None, 27, 1048);
        assert_eq!(cards.len(), 3);
        let footers: Vec<_> = cards
            .iter()
            .map(|c| c.footer.as_ref().unwrap().text.clone())
            .collect();
        assert_eq!(footers, vec!["1/3", "2/3", "3/3"]);
    }

    #[test]
    fn timestamp_is_rfc3339() {
        let now = DateTime::parse_from_rfc3339("2024-05-01T12:00:00+00:00")
            .unwrap()
            .with_timezone(&Utc);
        let cards = render_cards_at(&output("", CaptureStatus::Succeeded), None, 27, 1048, now);
        assert_eq!(cards[0].timestamp.as_deref(), Some("2024-05-01T12:00:00+00:00"));
    }
}
