use std::io::Cursor;

use calamine::{open_workbook_auto_from_rs, Data, Reader};

use crate::errors::{AppError, AppResult};

/// A sheet row with every cell rendered as text; empty cells are `""`.
pub type Row = Vec<String>;

pub const HEADER_SCAN_ROWS: usize = 10;

const HEADER_MARKERS: [&str; 3] = ["都道府県", "薬局", "店舗"];

/// Zero-based column index per semantic field, discovered from the header row.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ColumnMapping {
    pub pharmacy_number: Option<usize>,
    pub prefecture: Option<usize>,
    pub name: Option<usize>,
    pub address: Option<usize>,
    pub phone: Option<usize>,
    pub pharmacist_female: Option<usize>,
    pub pharmacist_male: Option<usize>,
    pub pharmacist_other: Option<usize>,
    pub website: Option<usize>,
    pub business_hours: Option<usize>,
    pub after_hours_service: Option<usize>,
    pub after_hours_phone: Option<usize>,
    pub privacy_measures: Option<usize>,
    pub advance_call_required: Option<usize>,
    pub notes: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderDetection {
    pub row_index: usize,
    pub mapping: ColumnMapping,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    PharmacyNumber,
    Prefecture,
    Name,
    Address,
    Phone,
    PharmacistCounts,
    Website,
    BusinessHours,
    AfterHoursService,
    AfterHoursPhone,
    PrivacyMeasures,
    AdvanceCallRequired,
    Notes,
}

struct HeaderRule {
    field: Field,
    exact: &'static [&'static str],
    contains: &'static [&'static str],
}

const HEADER_RULES: &[HeaderRule] = &[
    HeaderRule {
        field: Field::PharmacyNumber,
        exact: &["薬局等番号"],
        contains: &[],
    },
    HeaderRule {
        field: Field::Prefecture,
        exact: &["都道府県"],
        contains: &[],
    },
    HeaderRule {
        field: Field::Name,
        exact: &["薬局等名称"],
        contains: &["薬局名", "店舗名"],
    },
    HeaderRule {
        field: Field::Address,
        exact: &["住所"],
        contains: &[],
    },
    HeaderRule {
        field: Field::Phone,
        exact: &["電話番号"],
        contains: &[],
    },
    HeaderRule {
        field: Field::PharmacistCounts,
        exact: &["販売可能薬剤師数"],
        contains: &["販売可能薬剤師数", "薬剤師数"],
    },
    HeaderRule {
        field: Field::Website,
        exact: &["HP", "ホームページ", "URL"],
        contains: &[],
    },
    HeaderRule {
        field: Field::BusinessHours,
        exact: &["開局等時間"],
        contains: &["開局時間", "営業時間"],
    },
    HeaderRule {
        field: Field::AfterHoursService,
        exact: &["時間外対応"],
        contains: &[],
    },
    HeaderRule {
        field: Field::AfterHoursPhone,
        exact: &["時間外の電話番号"],
        contains: &[],
    },
    HeaderRule {
        field: Field::PrivacyMeasures,
        exact: &["プライバシー確保策"],
        contains: &["プライバシー"],
    },
    HeaderRule {
        field: Field::AdvanceCallRequired,
        exact: &["事前電話連絡"],
        contains: &[],
    },
    HeaderRule {
        field: Field::Notes,
        exact: &["備考"],
        contains: &[],
    },
];

impl ColumnMapping {
    /// Layout assumed when no header row can be found.
    pub fn fallback() -> Self {
        Self {
            prefecture: Some(0),
            name: Some(1),
            address: Some(2),
            phone: Some(3),
            notes: Some(4),
            ..Self::default()
        }
    }

    pub fn from_header_row(row: &[String]) -> Self {
        let mut mapping = Self::default();
        for (col, cell) in row.iter().enumerate() {
            if let Some(field) = classify(cell.trim()) {
                mapping.bind(field, col);
            }
        }
        mapping
    }

    fn bind(&mut self, field: Field, col: usize) {
        match field {
            Field::PharmacyNumber => self.pharmacy_number = Some(col),
            Field::Prefecture => self.prefecture = Some(col),
            Field::Name => self.name = Some(col),
            Field::Address => self.address = Some(col),
            // The sheet repeats this label for the after-hours block.
            Field::Phone => {
                if self.phone.is_none() {
                    self.phone = Some(col);
                }
            }
            // Sub-headers (female / male / undisclosed) sit on the next row,
            // so the three counts are bound positionally.
            Field::PharmacistCounts => {
                self.pharmacist_female = Some(col);
                self.pharmacist_male = Some(col + 1);
                self.pharmacist_other = Some(col + 2);
            }
            Field::Website => self.website = Some(col),
            Field::BusinessHours => self.business_hours = Some(col),
            Field::AfterHoursService => self.after_hours_service = Some(col),
            Field::AfterHoursPhone => self.after_hours_phone = Some(col),
            Field::PrivacyMeasures => self.privacy_measures = Some(col),
            Field::AdvanceCallRequired => self.advance_call_required = Some(col),
            Field::Notes => self.notes = Some(col),
        }
    }
}

fn classify(cell: &str) -> Option<Field> {
    if cell.is_empty() {
        return None;
    }
    HEADER_RULES
        .iter()
        .find(|rule| rule.exact.contains(&cell))
        .or_else(|| {
            HEADER_RULES
                .iter()
                .find(|rule| rule.contains.iter().any(|needle| cell.contains(needle)))
        })
        .map(|rule| rule.field)
}

fn is_header_row(row: &[String]) -> bool {
    let joined = row
        .iter()
        .map(|cell| cell.to_lowercase())
        .collect::<Vec<_>>()
        .join(" ");
    HEADER_MARKERS.iter().any(|marker| joined.contains(marker))
}

/// Scans the first [`HEADER_SCAN_ROWS`] rows for the header row.
pub fn detect_header(rows: &[Row]) -> Option<HeaderDetection> {
    rows.iter()
        .take(HEADER_SCAN_ROWS)
        .enumerate()
        .find(|(_, row)| is_header_row(row))
        .map(|(row_index, row)| HeaderDetection {
            row_index,
            mapping: ColumnMapping::from_header_row(row),
        })
}

/// Reads the first sheet of an xlsx/xls/ods workbook into text rows.
///
/// Row and column indices match the sheet even when the used range does not
/// start at A1.
pub fn read_first_sheet(bytes: Vec<u8>) -> AppResult<Vec<Row>> {
    let mut workbook = open_workbook_auto_from_rs(Cursor::new(bytes))?;
    let range = workbook
        .worksheet_range_at(0)
        .ok_or_else(|| AppError::Parse("workbook without sheets".into()))??;

    let (row_offset, col_offset) = range
        .start()
        .map(|(row, col)| (row as usize, col as usize))
        .unwrap_or((0, 0));

    let mut rows: Vec<Row> = vec![Vec::new(); row_offset];
    for cells in range.rows() {
        let mut row = vec![String::new(); col_offset];
        row.extend(cells.iter().map(cell_text));
        rows.push(row);
    }
    Ok(rows)
}

fn cell_text(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::String(text) => text.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(cells: &[&str]) -> Row {
        cells.iter().map(|c| c.to_string()).collect()
    }

    #[test]
    fn picks_first_row_with_marker() {
        let rows = vec![
            row(&["緊急避妊薬の販売が可能な一覧"]),
            row(&["令和6年10月1日時点"]),
            row(&[""]),
            row(&["都道府県", "薬局等名称", "住所", "電話番号"]),
            row(&["東京都", "○○薬局", "千代田区1-2-3", "03-1234-5678"]),
        ];

        let detection = detect_header(&rows).unwrap();
        assert_eq!(detection.row_index, 3);
        assert_eq!(detection.mapping.prefecture, Some(0));
        assert_eq!(detection.mapping.name, Some(1));
        assert_eq!(detection.mapping.address, Some(2));
        assert_eq!(detection.mapping.phone, Some(3));
    }

    #[test]
    fn ignores_markers_beyond_scan_window() {
        let mut rows = vec![row(&["-"]); HEADER_SCAN_ROWS];
        rows.push(row(&["都道府県", "薬局等名称"]));
        assert!(detect_header(&rows).is_none());
    }

    #[test]
    fn exact_pharmacist_label_binds_three_columns() {
        let header = row(&[
            "薬局等番号",
            "都道府県",
            "薬局等名称",
            "住所",
            "電話番号",
            "販売可能薬剤師数",
            "",
            "",
            "HP",
        ]);
        let mapping = ColumnMapping::from_header_row(&header);
        assert_eq!(mapping.pharmacist_female, Some(5));
        assert_eq!(mapping.pharmacist_male, Some(6));
        assert_eq!(mapping.pharmacist_other, Some(7));
        assert_eq!(mapping.website, Some(8));
        assert_eq!(mapping.pharmacy_number, Some(0));
    }

    #[test]
    fn first_phone_column_wins() {
        let header = row(&[
            "薬局等名称",
            "住所",
            "電話番号",
            "時間外対応",
            "電話番号",
            "時間外の電話番号",
        ]);
        let mapping = ColumnMapping::from_header_row(&header);
        assert_eq!(mapping.phone, Some(2));
        assert_eq!(mapping.after_hours_service, Some(3));
        assert_eq!(mapping.after_hours_phone, Some(5));
    }

    #[test]
    fn substring_rules_cover_label_drift() {
        let header = row(&[
            " 店舗名 ",
            "営業時間（平日）",
            "プライバシーへの配慮",
            "事前電話連絡",
            "備考",
        ]);
        let mapping = ColumnMapping::from_header_row(&header);
        assert_eq!(mapping.name, Some(0));
        assert_eq!(mapping.business_hours, Some(1));
        assert_eq!(mapping.privacy_measures, Some(2));
        assert_eq!(mapping.advance_call_required, Some(3));
        assert_eq!(mapping.notes, Some(4));
        assert_eq!(mapping.address, None);
    }

    #[test]
    fn exact_match_outranks_substring_match() {
        assert_eq!(classify("販売可能薬剤師数"), Some(Field::PharmacistCounts));
        assert_eq!(classify("薬局等名称"), Some(Field::Name));
        assert_eq!(classify("時間外の電話番号"), Some(Field::AfterHoursPhone));
        assert_eq!(classify("所在地"), None);
    }

    #[test]
    fn fallback_covers_first_five_columns() {
        let mapping = ColumnMapping::fallback();
        assert_eq!(mapping.prefecture, Some(0));
        assert_eq!(mapping.notes, Some(4));
        assert_eq!(mapping.pharmacist_female, None);
    }

    #[test]
    fn reads_offset_sheet_with_aligned_columns() {
        let mut workbook = rust_xlsxwriter::Workbook::new();
        let sheet = workbook.add_worksheet();
        let labels = ["都道府県", "薬局等名称", "住所", "販売可能薬剤師数"];
        for (col, label) in labels.iter().enumerate() {
            sheet.write_string(2, 1 + col as u16, *label).unwrap();
        }
        sheet.write_string(3, 1, "東京都").unwrap();
        sheet.write_string(3, 2, "○○薬局").unwrap();
        sheet.write_string(3, 3, "千代田区1").unwrap();
        sheet.write_number(3, 4, 2.0).unwrap();
        let bytes = workbook.save_to_buffer().unwrap();

        let rows = read_first_sheet(bytes).unwrap();
        assert_eq!(rows.len(), 4);
        assert!(rows[0].is_empty() && rows[1].is_empty());
        assert_eq!(rows[2][1], "都道府県");
        assert_eq!(rows[3][0], "");
        assert_eq!(rows[3][2], "○○薬局");
        assert_eq!(rows[3][4], "2");

        let detection = detect_header(&rows).unwrap();
        assert_eq!(detection.row_index, 2);
        assert_eq!(detection.mapping.prefecture, Some(1));
        assert_eq!(detection.mapping.pharmacist_female, Some(4));
    }

    #[test]
    fn rejects_non_workbook_bytes() {
        assert!(read_first_sheet(b"not a spreadsheet".to_vec()).is_err());
    }
}
