use crate::config::{FieldSpec, TextStyle};
use crate::form::FieldKind;
use chrono::NaiveDate;

pub const DEFAULT_MAX_CHARS_PER_LINE: usize = 20;

pub fn wrap(text: &str, max_chars_per_line: usize) -> Vec<String> {
    let max = max_chars_per_line.max(1);
    let chars: Vec<char> = text.chars().collect();
    if chars.len() <= max {
        return vec![text.to_string()];
    }

    let min_break = (max as f64 * 0.5).ceil() as usize;
    let mut lines = Vec::new();
    let mut remaining = trim_chars(&chars);
    while !remaining.is_empty() {
        if remaining.len() <= max {
            lines.push(collect_trimmed(remaining));
            break;
        }
        let window = &remaining[..=max];
        let break_at = match window.iter().rposition(|ch| *ch == ' ') {
            Some(pos) if pos >= min_break => pos,
            _ => max,
        };
        lines.push(collect_trimmed(&remaining[..break_at]));
        remaining = trim_chars(&remaining[break_at..]);
    }
    lines
}

fn trim_chars(chars: &[char]) -> &[char] {
    let start = chars
        .iter()
        .position(|ch| !ch.is_whitespace())
        .unwrap_or(chars.len());
    let end = chars
        .iter()
        .rposition(|ch| !ch.is_whitespace())
        .map(|pos| pos + 1)
        .unwrap_or(start);
    &chars[start..end.max(start)]
}

fn collect_trimmed(chars: &[char]) -> String {
    trim_chars(chars).iter().collect()
}

// Moves an anchor left by `char_width_pt` for every character past `threshold_chars`.
pub fn shifted_x(base_x: f64, text: &str, char_width_pt: f64, threshold_chars: usize) -> f64 {
    let len = text.chars().count();
    if len <= threshold_chars {
        return base_x;
    }
    base_x - (len - threshold_chars) as f64 * char_width_pt
}

pub fn format_us_date(value: &str) -> String {
    match parse_date(value) {
        Some(date) => date.format("%m/%d/%Y").to_string(),
        None => value.to_string(),
    }
}

pub(crate) fn parse_date(value: &str) -> Option<NaiveDate> {
    let trimmed = value.trim();
    let date_part = trimmed.split(['T', ' ']).next().unwrap_or(trimmed);
    NaiveDate::parse_from_str(date_part, "%Y-%m-%d")
        .or_else(|_| NaiveDate::parse_from_str(date_part, "%m/%d/%Y"))
        .ok()
}

#[derive(Debug, Clone, PartialEq)]
pub struct FieldTextLayout {
    pub x: f64,
    pub baseline_y: f64,
    pub line_height: f64,
    pub lines: Vec<String>,
}

impl FieldTextLayout {
    pub fn line_baseline(&self, index: usize) -> f64 {
        self.baseline_y - index as f64 * self.line_height
    }
}

pub fn display_text(spec: &FieldSpec, value: &str) -> String {
    match spec.kind {
        FieldKind::Date => format_us_date(value),
        _ => value.to_string(),
    }
}

pub fn layout_field(spec: &FieldSpec, value: &str, style: &TextStyle) -> Option<FieldTextLayout> {
    if value.trim().is_empty() {
        return None;
    }
    let text = display_text(spec, value.trim());
    let policy = spec.overflow;
    let x = if policy.dynamic_shift {
        shifted_x(
            spec.coordinate.x,
            &text,
            policy.char_width_pt,
            policy.threshold_chars,
        )
    } else {
        spec.coordinate.x
    };
    let lines = if policy.wrap {
        wrap(&text, policy.max_chars_per_line)
    } else {
        vec![text]
    };
    Some(FieldTextLayout {
        x,
        baseline_y: spec.coordinate.y,
        line_height: style.line_height_pt,
        lines,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ContractLayout, OverflowPolicy};

    #[test]
    fn short_text_is_returned_unchanged() {
        assert_eq!(wrap("", 20), vec![String::new()]);
        assert_eq!(wrap("exactly20characters!", 20), vec!["exactly20characters!"]);
        assert_eq!(wrap("  padded  ", 20), vec!["  padded  "]);
    }

    #[test]
    fn long_text_breaks_at_spaces_not_mid_word() {
        let lines = wrap("a very long line with many words", 20);
        assert_eq!(lines, vec!["a very long line", "with many words"]);
        let words: Vec<&str> = "a very long line with many words".split(' ').collect();
        for line in &lines {
            for word in line.split(' ') {
                assert!(words.contains(&word), "split inside a word: {word}");
            }
        }
    }

    #[test]
    fn early_space_is_ignored_and_hard_break_applies() {
        let lines = wrap("ab cdefghijklmnopqrstuvwxyz", 20);
        assert_eq!(lines, vec!["ab cdefghijklmnopqrs", "tuvwxyz"]);
        let lines = wrap("abcdefghijklmnopqrstuvwxyz", 10);
        assert_eq!(lines, vec!["abcdefghij", "klmnopqrst", "uvwxyz"]);
    }

    #[test]
    fn space_exactly_at_limit_is_used() {
        let lines = wrap("abcdefghijklmnopqrst uvw", 20);
        assert_eq!(lines, vec!["abcdefghijklmnopqrst", "uvw"]);
    }

    // Small LCG so generated inputs are stable across runs.
    fn words(seed: &mut u64, count: usize) -> Vec<String> {
        let mut next = || {
            *seed = seed.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
            (*seed >> 33) as usize
        };
        (0..count)
            .map(|_| {
                let len = 1 + next() % 14;
                (0..len).map(|_| (b'a' + (next() % 6) as u8) as char).collect()
            })
            .collect()
    }

    #[test]
    fn wrap_reaches_a_fixed_point() {
        // Inputs are single-spaced: runs of inner spaces collapse when the
        // wrapped lines are re-joined, so they are not a fixed point.
        let mut seed = 0x5eed_u64;
        for round in 0..400 {
            let count = 1 + round % 9;
            let text = words(&mut seed, count).join(" ");
            for n in 1..=25 {
                let first = wrap(&text, n);
                let second = wrap(&first.join(" "), n);
                assert_eq!(first, second, "unstable wrap for {text:?} at n={n}");
                assert!(first.iter().all(|line| !line.is_empty()));
                assert!(first.iter().all(|line| line.chars().count() <= n));
            }
        }
    }

    #[test]
    fn leading_padding_never_yields_a_blank_line() {
        let padded = format!("{}abc", " ".repeat(25));
        assert_eq!(wrap(&padded, 20), vec!["abc"]);

        let mut seed = 0xbead_u64;
        for pad in 0..30 {
            let text = format!("{}{}", " ".repeat(pad), words(&mut seed, 4).join(" "));
            for n in 1..=25 {
                let first = wrap(&text, n);
                if text.chars().count() <= n {
                    continue;
                }
                assert!(!first[0].is_empty(), "blank first line for {text:?} at n={n}");
                assert_eq!(first, wrap(&first.join(" "), n));
            }
        }
    }

    #[test]
    fn padded_owner_value_starts_on_the_anchor_line() {
        let layout = ContractLayout::rental_agreement();
        let owner = layout.field("owner").expect("owner");
        let plain = layout_field(owner, "Maria Elena Rodriguez!", &layout.text).expect("layout");
        let padded = layout_field(owner, "    Maria Elena Rodriguez!  ", &layout.text).expect("layout");
        assert_eq!(padded, plain);
        assert_eq!(padded.lines[0], "Maria Elena");
    }

    #[test]
    fn wrap_is_deterministic_and_handles_multibyte() {
        let text = "Zoë Ångström-Müller de la Peña";
        assert_eq!(wrap(text, 12), wrap(text, 12));
        for line in wrap(text, 12) {
            assert!(line.chars().count() <= 12);
        }
    }

    #[test]
    fn shift_is_identity_at_or_below_threshold() {
        assert_eq!(shifted_x(340.0, "fifteen chars!!", 8.0, 15), 340.0);
        assert_eq!(shifted_x(340.0, "short", 8.0, 15), 340.0);
    }

    #[test]
    fn shift_is_monotonic_past_threshold() {
        let mut previous = shifted_x(340.0, "", 8.0, 15);
        for len in 1..60 {
            let text = "x".repeat(len);
            let x = shifted_x(340.0, &text, 8.0, 15);
            assert!(x <= previous, "shift increased at len={len}");
            previous = x;
        }
        assert_eq!(shifted_x(340.0, &"x".repeat(22), 8.0, 15), 284.0);
    }

    #[test]
    fn dates_normalize_to_us_format() {
        assert_eq!(format_us_date("2025-03-07"), "03/07/2025");
        assert_eq!(format_us_date("2025-03-07T00:00:00Z"), "03/07/2025");
        assert_eq!(format_us_date("03/07/2025"), "03/07/2025");
        assert_eq!(format_us_date("next tuesday"), "next tuesday");
    }

    #[test]
    fn owner_overflow_scenario() {
        let layout = ContractLayout::rental_agreement();
        let owner = layout.field("owner").expect("owner field");
        assert_eq!(owner.overflow, OverflowPolicy::WRAP_AND_SHIFT);
        let value = "Maria Elena Rodriguez!";
        assert_eq!(value.chars().count(), 22);
        let placed = layout_field(owner, value, &layout.text).expect("layout");
        assert_eq!(placed.x, 284.0);
        assert_eq!(placed.lines, vec!["Maria Elena", "Rodriguez!"]);
        assert_eq!(placed.line_baseline(1), owner.coordinate.y - 14.0);
    }

    #[test]
    fn non_overflow_fields_never_wrap() {
        let layout = ContractLayout::rental_agreement();
        let address = layout.field("owner_address").expect("address");
        let value = "1234 Fleet Avenue Suite 500 Springfield";
        let placed = layout_field(address, value, &layout.text).expect("layout");
        assert_eq!(placed.lines, vec![value.to_string()]);
        assert_eq!(placed.x, address.coordinate.x);
        assert!(layout_field(address, "   ", &layout.text).is_none());
    }
}
