use crate::table::Row;
use std::collections::HashMap;

/// Rows sharing one key, in source order
pub(crate) type Group<'a> = (String, Vec<&'a Row>);

/// Rendered key of a row, `None` for missing or blank key cells.
/// Keys are compared as text since they end up as sheet and file names.
pub(crate) fn group_key(row: &Row, column: usize) -> Option<String> {
    row.get(column)
        .and_then(Option::as_ref)
        .filter(|value| !value.is_blank())
        .map(|value| value.to_string())
}

/// Partitions rows by the rendered value of `column`.
///
/// Groups come out in the order their key is first seen; rows without a key are
/// left out.
pub(crate) fn group_rows<'a, I>(rows: I, column: usize) -> Vec<Group<'a>>
where
    I: IntoIterator<Item = &'a Row>,
{
    let mut groups: Vec<Group<'a>> = Vec::new();
    let mut indexes: HashMap<String, usize> = HashMap::new();
    for row in rows {
        let Some(key) = group_key(row, column) else {
            continue;
        };
        match indexes.get(&key) {
            Some(index) => groups[*index].1.push(row),
            None => {
                indexes.insert(key.clone(), groups.len());
                groups.push((key, vec![row]));
            }
        }
    }
    groups
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spreadsheet::CellValue;

    fn row(values: &[Option<&str>]) -> Row {
        values
            .iter()
            .map(|value| value.map(|text| CellValue::Text(text.to_owned())))
            .collect()
    }

    #[test]
    fn groups_in_first_seen_order() {
        let rows = vec![
            row(&[Some("1"), Some("B")]),
            row(&[Some("2"), Some("A")]),
            row(&[Some("3"), Some("B")]),
            row(&[Some("4"), Some("A")]),
        ];
        let groups = group_rows(&rows, 1);
        let keys: Vec<&str> = groups.iter().map(|(key, _)| key.as_str()).collect();
        assert_eq!(keys, vec!["B", "A"]);
        assert_eq!(groups[0].1, vec![&rows[0], &rows[2]]);
        assert_eq!(groups[1].1, vec![&rows[1], &rows[3]]);
    }

    #[test]
    fn rows_without_key_are_left_out() {
        let rows = vec![
            row(&[Some("1"), None]),
            row(&[Some("2"), Some("  ")]),
            row(&[Some("3")]),
            row(&[Some("4"), Some("A")]),
        ];
        let groups = group_rows(&rows, 1);
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].1, vec![&rows[3]]);
    }

    #[test]
    fn numeric_keys_render_without_fraction() {
        let rows = vec![vec![Some(CellValue::Number(2024.0))], vec![Some(CellValue::Number(2024.5))]];
        let keys: Vec<String> = group_rows(&rows, 0).into_iter().map(|(key, _)| key).collect();
        assert_eq!(keys, vec!["2024", "2024.5"]);
    }

    #[test]
    fn keys_rendering_alike_share_a_group() {
        let rows = vec![
            vec![Some(CellValue::Number(1.0))],
            vec![Some(CellValue::Text("1".to_owned()))],
            vec![Some(CellValue::Boolean(true))],
        ];
        let groups = group_rows(&rows, 0);
        let keys: Vec<&str> = groups.iter().map(|(key, _)| key.as_str()).collect();
        assert_eq!(keys, vec!["1", "TRUE"]);
        assert_eq!(groups[0].1, vec![&rows[0], &rows[1]]);
    }
}
