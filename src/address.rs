use once_cell::sync::Lazy;
use regex::Regex;

const HYPHEN_VARIANTS: [char; 4] = ['ー', '−', '―', '－'];

static PREFECTURE_PREFIX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(北海道|東京都|大阪府|京都府|.{2,3}県)").expect("valid prefecture pattern")
});

static MUNICIPALITY_PREFIX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(北海道|東京都|大阪府|京都府|.{2,3}県)(.+?[市区町村郡])")
        .expect("valid municipality pattern")
});

static BANCHI: Lazy<Regex> = Lazy::new(|| Regex::new(r"番地?").expect("valid banchi pattern"));

static HYPHEN_RUN: Lazy<Regex> = Lazy::new(|| Regex::new(r"-+").expect("valid hyphen pattern"));

/// Canonicalizes a Japanese street address for geocoder queries.
///
/// `東京都千代田区１丁目２番地３号` becomes `東京都千代田区1-2-3`.
pub fn normalize_address(raw: &str) -> String {
    let compact: String = raw
        .chars()
        .filter(|c| !c.is_whitespace())
        .map(|c| match c {
            '０'..='９' => char::from(b'0' + (c as u32 - '０' as u32) as u8),
            c if HYPHEN_VARIANTS.contains(&c) => '-',
            c => c,
        })
        .collect();

    let replaced = compact.replace("丁目", "-");
    let replaced = BANCHI.replace_all(&replaced, "-");
    let replaced = replaced.replace('号', "");
    let collapsed = HYPHEN_RUN.replace_all(&replaced, "-");
    collapsed
        .strip_suffix('-')
        .unwrap_or(&collapsed)
        .to_string()
}

/// Cuts an address down to prefecture + municipality, or returns it unchanged.
pub fn shorten_address(address: &str) -> String {
    match MUNICIPALITY_PREFIX.captures(address) {
        Some(caps) => format!("{}{}", &caps[1], &caps[2]),
        None => address.to_string(),
    }
}

pub fn leading_prefecture(address: &str) -> Option<&str> {
    PREFECTURE_PREFIX
        .captures(address)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
}

pub fn starts_with_prefecture(address: &str) -> bool {
    PREFECTURE_PREFIX.is_match(address)
}
