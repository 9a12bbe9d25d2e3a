use quick_xml::events::{BytesStart, Event};
use quick_xml::{Reader, Writer};

use crate::error::Result;

pub const CALC_CHAIN_PART: &str = "xl/calcChain.xml";

/// What to do about calculation state once cached formula results have been dropped.
///
/// Consumers recompute formulas that lack a cached `<v>` anyway; these switches additionally ask
/// for a full recalculation on open and discard a calc chain that may no longer match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RecalcPolicy {
    /// Set `<calcPr fullCalcOnLoad="1"/>` in `xl/workbook.xml`.
    pub full_calc_on_load: bool,
    /// Remove `xl/calcChain.xml` together with its content type and workbook relationship.
    pub drop_calc_chain: bool,
}

impl RecalcPolicy {
    /// Leave calculation metadata alone.
    pub const PRESERVE: Self = Self {
        full_calc_on_load: false,
        drop_calc_chain: false,
    };

    /// Force a clean recalculation the next time the workbook is opened.
    pub const RECALC_ON_OPEN: Self = Self {
        full_calc_on_load: true,
        drop_calc_chain: true,
    };

    pub fn is_noop(&self) -> bool {
        !self.full_calc_on_load && !self.drop_calc_chain
    }
}

/// `CT_Workbook` children that must follow `<calcPr>`.
const AFTER_CALC_PR: &[&[u8]] = &[
    b"oleSize",
    b"customWorkbookViews",
    b"pivotCaches",
    b"smartTagPr",
    b"smartTagTypes",
    b"webPublishing",
    b"fileRecoveryPr",
    b"webPublishObjects",
    b"extLst",
];

fn prefixed(prefix: &[u8], local: &str) -> String {
    if prefix.is_empty() {
        local.to_string()
    } else {
        format!("{}:{local}", String::from_utf8_lossy(prefix))
    }
}

fn new_calc_pr(prefix: &[u8]) -> BytesStart<'static> {
    let mut calc_pr = BytesStart::new(prefixed(prefix, "calcPr"));
    calc_pr.push_attribute(("fullCalcOnLoad", "1"));
    calc_pr
}

fn patched_calc_pr(e: &BytesStart<'_>) -> Result<BytesStart<'static>> {
    let name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
    let mut calc_pr = BytesStart::new(name);
    for attr in e.attributes() {
        let attr = attr?;
        if attr.key.as_ref() == b"fullCalcOnLoad" {
            continue;
        }
        calc_pr.push_attribute((attr.key.as_ref(), attr.value.as_ref()));
    }
    calc_pr.push_attribute(("fullCalcOnLoad", "1"));
    Ok(calc_pr)
}

/// Rewrite `xl/workbook.xml` so the consumer performs a full calculation on load.
///
/// An existing `<calcPr>` keeps its other attributes; a missing one is created in schema order.
pub fn force_full_calc_on_load(workbook_xml: &[u8]) -> Result<Vec<u8>> {
    let mut reader = Reader::from_reader(workbook_xml);
    reader.config_mut().trim_text(false);
    let mut writer = Writer::new(Vec::with_capacity(workbook_xml.len() + 64));

    let mut buf = Vec::new();
    let mut depth = 0usize;
    let mut prefix: Vec<u8> = Vec::new();
    let mut saw_calc_pr = false;

    loop {
        let event = reader.read_event_into(&mut buf)?;
        match event {
            Event::Eof => break,
            Event::Start(ref e) | Event::Empty(ref e) => {
                let is_empty = matches!(event, Event::Empty(_));
                let local = e.local_name();
                if depth == 0 {
                    prefix = e.name().prefix().map(|p| p.as_ref().to_vec()).unwrap_or_default();
                } else if depth == 1 && local.as_ref() == b"calcPr" {
                    saw_calc_pr = true;
                    let patched = patched_calc_pr(e)?;
                    writer.write_event(if is_empty {
                        Event::Empty(patched)
                    } else {
                        Event::Start(patched)
                    })?;
                    if !is_empty {
                        depth += 1;
                    }
                    buf.clear();
                    continue;
                } else if depth == 1
                    && !saw_calc_pr
                    && AFTER_CALC_PR.iter().any(|name| *name == local.as_ref())
                {
                    saw_calc_pr = true;
                    writer.write_event(Event::Empty(new_calc_pr(&prefix)))?;
                }
                if !is_empty {
                    depth += 1;
                }
                writer.write_event(event.into_owned())?;
            }
            Event::End(ref e) => {
                depth = depth.saturating_sub(1);
                if depth == 0 && !saw_calc_pr {
                    saw_calc_pr = true;
                    writer.write_event(Event::Empty(new_calc_pr(&prefix)))?;
                }
                writer.write_event(Event::End(e.to_owned()))?;
            }
            other => writer.write_event(other.into_owned())?,
        }
        buf.clear();
    }

    Ok(writer.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(xml: &str) -> String {
        String::from_utf8(force_full_calc_on_load(xml.as_bytes()).unwrap()).unwrap()
    }

    #[test]
    fn existing_calc_pr_keeps_its_attributes() {
        let out = run(r#"<workbook xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main"><sheets/><calcPr calcId="191029" fullCalcOnLoad="0"/></workbook>"#);
        assert!(out.contains(r#"<calcPr calcId="191029" fullCalcOnLoad="1"/>"#), "{out}");
        assert_eq!(out.matches("calcPr").count(), 1);
    }

    #[test]
    fn missing_calc_pr_is_inserted_before_ext_lst() {
        let out = run(r#"<x:workbook xmlns:x="http://schemas.openxmlformats.org/spreadsheetml/2006/main"><x:sheets/><x:extLst><x:ext/></x:extLst></x:workbook>"#);
        assert!(
            out.contains(r#"<x:sheets/><x:calcPr fullCalcOnLoad="1"/><x:extLst>"#),
            "{out}"
        );
    }

    #[test]
    fn missing_calc_pr_is_appended_last_otherwise() {
        let out = run(r#"<workbook><sheets><sheet name="A"/></sheets></workbook>"#);
        assert!(out.ends_with(r#"</sheets><calcPr fullCalcOnLoad="1"/></workbook>"#), "{out}");
    }

    #[test]
    fn default_policy_preserves_everything() {
        assert!(RecalcPolicy::default().is_noop());
        assert_eq!(RecalcPolicy::default(), RecalcPolicy::PRESERVE);
        assert!(!RecalcPolicy::RECALC_ON_OPEN.is_noop());
    }
}
