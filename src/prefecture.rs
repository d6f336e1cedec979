//! Approximate latitude bands per prefecture, used to reject geocoder hits that
//! landed on a same-named place elsewhere in the country.

/// `(prefecture, min_lat, max_lat)`, inclusive.
pub const PREFECTURE_LAT_RANGES: [(&str, f64, f64); 47] = [
    ("北海道", 41.3, 45.6),
    ("青森県", 40.2, 41.6),
    ("岩手県", 38.7, 40.5),
    ("宮城県", 37.8, 39.0),
    ("秋田県", 39.0, 40.5),
    ("山形県", 37.7, 39.2),
    ("福島県", 36.8, 37.9),
    ("茨城県", 35.7, 36.9),
    ("栃木県", 36.2, 37.2),
    ("群馬県", 36.0, 37.1),
    ("埼玉県", 35.7, 36.3),
    ("千葉県", 34.9, 36.0),
    ("東京都", 35.5, 35.9),
    ("神奈川県", 35.1, 35.7),
    ("新潟県", 37.0, 38.6),
    ("富山県", 36.3, 36.9),
    ("石川県", 36.1, 37.5),
    ("福井県", 35.4, 36.3),
    ("山梨県", 35.2, 35.9),
    ("長野県", 35.2, 37.0),
    ("岐阜県", 35.1, 36.5),
    ("静岡県", 34.6, 35.6),
    ("愛知県", 34.6, 35.4),
    ("三重県", 33.7, 35.2),
    ("滋賀県", 34.8, 35.7),
    ("京都府", 34.7, 35.8),
    ("大阪府", 34.3, 35.0),
    ("兵庫県", 34.2, 35.7),
    ("奈良県", 33.9, 34.8),
    ("和歌山県", 33.4, 34.4),
    ("鳥取県", 35.1, 35.6),
    ("島根県", 34.3, 36.3),
    ("岡山県", 34.4, 35.3),
    ("広島県", 34.0, 35.1),
    ("山口県", 33.7, 34.8),
    ("徳島県", 33.7, 34.3),
    ("香川県", 34.1, 34.5),
    ("愛媛県", 32.9, 34.1),
    ("高知県", 32.7, 33.9),
    ("福岡県", 33.0, 33.9),
    ("佐賀県", 33.0, 33.6),
    ("長崎県", 32.5, 34.7),
    ("熊本県", 32.0, 33.2),
    ("大分県", 32.7, 33.8),
    ("宮崎県", 31.4, 32.9),
    ("鹿児島県", 27.0, 32.3),
    ("沖縄県", 24.0, 27.9),
];

pub fn latitude_range(prefecture: &str) -> Option<(f64, f64)> {
    PREFECTURE_LAT_RANGES
        .iter()
        .find(|(name, _, _)| *name == prefecture)
        .map(|(_, min, max)| (*min, *max))
}

/// Unknown prefectures pass.
pub fn is_within_prefecture(lat: f64, prefecture: &str) -> bool {
    match latitude_range(prefecture) {
        Some((min, max)) => lat >= min && lat <= max,
        None => true,
    }
}
