//! Media type negotiation helpers.
use mime::Mime;

/// The lowercase `type/subtype` of a `Content-Type` value, without parameters.
pub fn essence(content_type: &str) -> Option<String> {
    let content_type = content_type.trim();
    if content_type.is_empty() {
        return None;
    }
    match content_type.parse::<Mime>() {
        Ok(mime) => Some(mime.essence_str().to_ascii_lowercase()),
        Err(_) => content_type
            .split(';')
            .next()
            .map(|essence| essence.trim().to_ascii_lowercase()),
    }
}

struct MediaRange {
    mime: Mime,
    quality: f32,
}

fn parse_accept(header: &str) -> Vec<MediaRange> {
    header
        .split(',')
        .map(str::trim)
        .filter(|range| !range.is_empty())
        .filter_map(|range| range.parse::<Mime>().ok())
        .map(|mime| {
            let quality = mime
                .get_param("q")
                .and_then(|q| q.as_str().parse::<f32>().ok())
                .unwrap_or(1.0)
                .clamp(0.0, 1.0);
            MediaRange { mime, quality }
        })
        .collect()
}

fn specificity(range: &Mime, offered: &Mime) -> Option<u8> {
    if range.type_() == mime::STAR && range.subtype() == mime::STAR {
        Some(0)
    } else if range.type_() == offered.type_() && range.subtype() == mime::STAR {
        Some(1)
    } else if range.essence_str() == offered.essence_str() {
        Some(2)
    } else {
        None
    }
}

/// Picks the offered media type an `Accept` header prefers.
///
/// Each offer takes the quality of the most specific range matching it. The offer with the
/// highest non-zero quality wins; ties go to the earliest offer.
pub fn best_match<'a>(accept: &str, offered: &[&'a str]) -> Option<&'a str> {
    let ranges = parse_accept(accept);
    let mut best: Option<(&'a str, f32)> = None;

    for &candidate in offered {
        let Ok(mime) = candidate.parse::<Mime>() else {
            continue;
        };
        let quality = ranges
            .iter()
            .filter_map(|range| specificity(&range.mime, &mime).map(|s| (s, range.quality)))
            .max_by_key(|(s, _)| *s)
            .map(|(_, quality)| quality);

        if let Some(quality) = quality {
            if quality > 0.0 && best.is_none_or(|(_, best_quality)| quality > best_quality) {
                best = Some((candidate, quality));
            }
        }
    }

    best.map(|(candidate, _)| candidate)
}

#[cfg(test)]
mod tests {
    use super::*;

    const OFFERED: [&str; 2] = ["application/json", "text/xml"];

    #[test]
    fn essence_drops_parameters() {
        assert_eq!(
            essence("Application/JSON; charset=UTF-8").as_deref(),
            Some("application/json")
        );
        assert_eq!(essence("  "), None);
    }

    #[test]
    fn exact_and_wildcard_ranges() {
        assert_eq!(best_match("text/xml", &OFFERED), Some("text/xml"));
        assert_eq!(best_match("*/*", &OFFERED), Some("application/json"));
        assert_eq!(best_match("text/*", &OFFERED), Some("text/xml"));
        assert_eq!(best_match("text/html", &OFFERED), None);
    }

    #[test]
    fn quality_values_rank_offers() {
        assert_eq!(
            best_match("application/json;q=0.5, text/xml", &OFFERED),
            Some("text/xml")
        );
        assert_eq!(
            best_match(
                "text/html,application/xml;q=0.9,*/*;q=0.8",
                &["application/json", "application/xml"],
            ),
            Some("application/xml")
        );
        assert_eq!(best_match("application/json;q=0", &OFFERED), None);
    }

    #[test]
    fn specific_ranges_override_wildcards() {
        assert_eq!(
            best_match("*/*;q=0.9, application/json;q=0", &OFFERED),
            Some("text/xml")
        );
    }
}
