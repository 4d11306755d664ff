use log::debug;

use crate::roi::Roi;
use crate::table::RoiTable;

/// Pick one ROI from `table`: the one called `name`, or the first row.
pub fn select_roi(table: &RoiTable, name: Option<&str>) -> crate::Result<Roi> {
    let roi = match name {
        Some(name) => table
            .get(name)
            .ok_or_else(|| crate::Error::not_found(format!("ROI {name:?} in table")))?,
        None => table.rois().first().ok_or_else(|| {
            crate::Error::EmptySource("cannot select an ROI from an empty table".into())
        })?,
    };
    debug!("Selected ROI {:?}", roi.name);
    Ok(roi.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::build_explicit_table;

    fn table() -> RoiTable {
        build_explicit_table(vec![
            Roi::new("FOV_1", [0.0; 3], [10.0; 3]).unwrap(),
            Roi::new("FOV_2", [10.0, 0.0, 0.0], [10.0; 3]).unwrap(),
        ])
        .unwrap()
    }

    #[test]
    fn defaults_to_first_row() {
        assert_eq!(select_roi(&table(), None).unwrap().name, "FOV_1");
    }

    #[test]
    fn selects_by_name() {
        assert_eq!(select_roi(&table(), Some("FOV_2")).unwrap().x, 10.0);
    }

    #[test]
    fn missing_name() {
        assert!(matches!(
            select_roi(&table(), Some("FOV_9")),
            Err(crate::Error::NotFound(_))
        ));
    }

    #[test]
    fn empty_table() {
        let empty = build_explicit_table(Vec::new()).unwrap();
        assert!(matches!(
            select_roi(&empty, None),
            Err(crate::Error::EmptySource(_))
        ));
    }
}
