use crate::directory::{sheet_nodes, SheetVisibility};
use crate::error::{InjectError, Result};
use crate::xml::XmlTree;

/// Set the `state` of the sheet called `name` in a parsed `xl/workbook.xml`.
///
/// Returns `false` without touching the tree when the sheet already has that visibility.
pub fn set_sheet_state(
    workbook: &mut XmlTree,
    name: &str,
    visibility: SheetVisibility,
) -> Result<bool> {
    let sheet = sheet_nodes(workbook)
        .into_iter()
        .find(|sheet| workbook.attr(*sheet, "name") == Some(name))
        .ok_or_else(|| InjectError::Invalid(format!("sheet {name:?} missing from workbook.xml")))?;

    if SheetVisibility::from_state_attr(workbook.attr(sheet, "state")) == visibility {
        return Ok(false);
    }
    match visibility.state_attr() {
        Some(state) => workbook.set_attr(sheet, "state", state),
        None => {
            workbook.remove_attr(sheet, "state");
        }
    }
    Ok(true)
}

/// Number of sheets a user can see in the tab bar.
pub fn visible_sheet_count(workbook: &XmlTree) -> usize {
    sheet_nodes(workbook)
        .into_iter()
        .filter(|sheet| {
            SheetVisibility::from_state_attr(workbook.attr(*sheet, "state"))
                == SheetVisibility::Visible
        })
        .count()
}
