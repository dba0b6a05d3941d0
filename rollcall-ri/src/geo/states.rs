//! US state and territory names, postal codes and ZIP prefixes
//!
//! Used to canonicalize provider state fields and as the offline state-only
//! resolution path when the external geocoder is unavailable.

/// (postal code, full name)
const STATES: &[(&str, &str)] = &[
    ("AL", "alabama"),
    ("AK", "alaska"),
    ("AZ", "arizona"),
    ("AR", "arkansas"),
    ("CA", "california"),
    ("CO", "colorado"),
    ("CT", "connecticut"),
    ("DE", "delaware"),
    ("DC", "district of columbia"),
    ("FL", "florida"),
    ("GA", "georgia"),
    ("HI", "hawaii"),
    ("ID", "idaho"),
    ("IL", "illinois"),
    ("IN", "indiana"),
    ("IA", "iowa"),
    ("KS", "kansas"),
    ("KY", "kentucky"),
    ("LA", "louisiana"),
    ("ME", "maine"),
    ("MD", "maryland"),
    ("MA", "massachusetts"),
    ("MI", "michigan"),
    ("MN", "minnesota"),
    ("MS", "mississippi"),
    ("MO", "missouri"),
    ("MT", "montana"),
    ("NE", "nebraska"),
    ("NV", "nevada"),
    ("NH", "new hampshire"),
    ("NJ", "new jersey"),
    ("NM", "new mexico"),
    ("NY", "new york"),
    ("NC", "north carolina"),
    ("ND", "north dakota"),
    ("OH", "ohio"),
    ("OK", "oklahoma"),
    ("OR", "oregon"),
    ("PA", "pennsylvania"),
    ("RI", "rhode island"),
    ("SC", "south carolina"),
    ("SD", "south dakota"),
    ("TN", "tennessee"),
    ("TX", "texas"),
    ("UT", "utah"),
    ("VT", "vermont"),
    ("VA", "virginia"),
    ("WA", "washington"),
    ("WV", "west virginia"),
    ("WI", "wisconsin"),
    ("WY", "wyoming"),
    ("AS", "american samoa"),
    ("GU", "guam"),
    ("MP", "northern mariana islands"),
    ("PR", "puerto rico"),
    ("VI", "virgin islands"),
];

/// Inclusive ZIP3 ranges → postal code (approximate USPS allocation)
const ZIP3_RANGES: &[(u16, u16, &str)] = &[
    (5, 5, "NY"),
    (6, 7, "PR"),
    (8, 8, "VI"),
    (9, 9, "PR"),
    (10, 27, "MA"),
    (28, 29, "RI"),
    (30, 38, "NH"),
    (39, 49, "ME"),
    (50, 54, "VT"),
    (55, 55, "MA"),
    (56, 59, "VT"),
    (60, 69, "CT"),
    (70, 89, "NJ"),
    (100, 149, "NY"),
    (150, 196, "PA"),
    (197, 199, "DE"),
    (200, 205, "DC"),
    (206, 219, "MD"),
    (220, 246, "VA"),
    (247, 268, "WV"),
    (270, 289, "NC"),
    (290, 299, "SC"),
    (300, 319, "GA"),
    (320, 349, "FL"),
    (350, 369, "AL"),
    (370, 385, "TN"),
    (386, 397, "MS"),
    (398, 399, "GA"),
    (400, 427, "KY"),
    (430, 459, "OH"),
    (460, 479, "IN"),
    (480, 499, "MI"),
    (500, 528, "IA"),
    (530, 549, "WI"),
    (550, 567, "MN"),
    (570, 577, "SD"),
    (580, 588, "ND"),
    (590, 599, "MT"),
    (600, 629, "IL"),
    (630, 658, "MO"),
    (660, 679, "KS"),
    (680, 693, "NE"),
    (700, 715, "LA"),
    (716, 729, "AR"),
    (730, 749, "OK"),
    (750, 799, "TX"),
    (800, 816, "CO"),
    (820, 831, "WY"),
    (832, 838, "ID"),
    (840, 847, "UT"),
    (850, 865, "AZ"),
    (870, 884, "NM"),
    (885, 885, "TX"),
    (889, 898, "NV"),
    (900, 961, "CA"),
    (967, 968, "HI"),
    (969, 969, "GU"),
    (970, 979, "OR"),
    (980, 994, "WA"),
    (995, 999, "AK"),
];

/// Canonical postal code for a code or full name ("wa", "Washington", "D.C.")
pub fn to_postal_code(raw: &str) -> Option<&'static str> {
    let cleaned: String = raw
        .trim()
        .to_ascii_lowercase()
        .replace('.', "")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ");

    if cleaned.len() == 2 {
        return STATES
            .iter()
            .find(|(code, _)| code.eq_ignore_ascii_case(&cleaned))
            .map(|(code, _)| *code);
    }

    if cleaned == "washington dc" {
        return Some("DC");
    }

    STATES
        .iter()
        .find(|(_, name)| *name == cleaned)
        .map(|(code, _)| *code)
}

/// State for a 5-digit ZIP code
pub fn state_for_zip(zip: &str) -> Option<&'static str> {
    if zip.len() < 3 || !zip.chars().take(3).all(|c| c.is_ascii_digit()) {
        return None;
    }
    let prefix: u16 = zip[..3].parse().ok()?;
    ZIP3_RANGES
        .iter()
        .find(|(lo, hi, _)| (*lo..=*hi).contains(&prefix))
        .map(|(_, _, code)| *code)
}

/// Find a state in a normalized (lower-case, comma-separated) address
///
/// Looks at trailing components only, so "Washington Ave" in the street
/// line does not resolve to WA. Explicit state beats ZIP prefix.
pub fn find_in_address(normalized: &str) -> Option<&'static str> {
    let components: Vec<&str> = normalized.split(',').map(str::trim).collect();
    // The street line is never a state
    let tail = if components.len() > 1 { &components[1..] } else { &components[..0] };

    let mut zip_state = None;
    for component in tail.iter().rev() {
        let words: Vec<&str> = component.split_whitespace().collect();

        for word in words.iter().rev() {
            if word.len() == 5 || word.len() == 10 {
                if let Some(state) = state_for_zip(word) {
                    zip_state.get_or_insert(state);
                }
            }
        }

        // Longest trailing word run first ("new york" before "york")
        let non_zip: Vec<&str> = words
            .iter()
            .copied()
            .filter(|w| !w.chars().next().is_some_and(|c| c.is_ascii_digit()))
            .collect();
        for take in (1..=non_zip.len().min(4)).rev() {
            let candidate = non_zip[non_zip.len() - take..].join(" ");
            if let Some(code) = to_postal_code(&candidate) {
                return Some(code);
            }
        }
    }

    zip_state
}
