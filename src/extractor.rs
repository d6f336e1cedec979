use crate::address::{leading_prefecture, starts_with_prefecture};
use crate::model::PharmacyRecord;
use crate::spreadsheet::{ColumnMapping, Row};

const ID_PREFIX: &str = "pharmacy-";

/// Turns the rows below `header_row_index` into records, dropping rows without
/// a name or an address. Coordinates are left unset.
pub fn extract_records(
    rows: &[Row],
    header_row_index: usize,
    mapping: &ColumnMapping,
) -> Vec<PharmacyRecord> {
    rows.iter()
        .enumerate()
        .skip(header_row_index + 1)
        .filter_map(|(index, row)| extract_row(index, row, mapping))
        .collect()
}

fn extract_row(index: usize, row: &Row, mapping: &ColumnMapping) -> Option<PharmacyRecord> {
    if row.is_empty() {
        return None;
    }
    let cell = |col: Option<usize>| -> String {
        col.and_then(|idx| row.get(idx))
            .map(|value| value.trim().to_string())
            .unwrap_or_default()
    };

    let name = cell(mapping.name);
    let address = cell(mapping.address);
    if name.is_empty() || address.is_empty() {
        return None;
    }

    let mut prefecture = cell(mapping.prefecture);
    if prefecture.is_empty() {
        if let Some(found) = leading_prefecture(&address) {
            prefecture = found.to_string();
        }
    }
    let address = prefix_prefecture(&prefecture, address);

    Some(PharmacyRecord {
        id: format!("{ID_PREFIX}{index}"),
        pharmacy_number: non_empty(cell(mapping.pharmacy_number)),
        prefecture,
        name,
        address,
        phone: format_phone(&cell(mapping.phone)),
        lat: None,
        lng: None,
        pharmacist_female: parse_count(&cell(mapping.pharmacist_female)),
        pharmacist_male: parse_count(&cell(mapping.pharmacist_male)),
        pharmacist_other: parse_count(&cell(mapping.pharmacist_other)),
        website: non_empty(cell(mapping.website)),
        business_hours: non_empty(cell(mapping.business_hours)),
        after_hours_service: non_empty(cell(mapping.after_hours_service)),
        after_hours_phone: non_empty(cell(mapping.after_hours_phone))
            .map(|phone| format_phone(&phone)),
        privacy_measures: non_empty(cell(mapping.privacy_measures)),
        advance_call_required: non_empty(cell(mapping.advance_call_required)),
        notes: non_empty(cell(mapping.notes)),
    })
}

fn prefix_prefecture(prefecture: &str, address: String) -> String {
    if prefecture.is_empty()
        || address.starts_with(prefecture)
        || starts_with_prefecture(&address)
    {
        address
    } else {
        format!("{prefecture}{address}")
    }
}

/// Keeps only ASCII digits and hyphens.
pub fn format_phone(raw: &str) -> String {
    raw.chars()
        .filter(|c| c.is_ascii_digit() || *c == '-')
        .collect()
}

/// Leading-integer parse: `"2"` and `"2人"` give 2, `""` and `"-"` give `None`.
pub fn parse_count(raw: &str) -> Option<u32> {
    let digits: String = raw
        .trim()
        .trim_start_matches('+')
        .chars()
        .take_while(|c| c.is_ascii_digit())
        .collect();
    digits.parse().ok()
}

fn non_empty(value: String) -> Option<String> {
    if value.is_empty() {
        None
    } else {
        Some(value)
    }
}
