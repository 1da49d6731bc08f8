//! Type template resolution.
//!
//! Walks `LNodeType -> DOType -> DAType` (and `EnumType` for enumerations)
//! to find the CDC of a data object path and the basic type of a data
//! attribute path below it. Every broken link degrades to "unknown".

use crate::scl::{ElementId, SclDocument};
use crate::utils::split_path;
use serde::Serialize;

/// CDC of the data object and `bType` of the data attribute; `None` = unknown.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct DataSpecification {
    pub cdc: Option<String>,
    pub btype: Option<String>,
}

impl DataSpecification {
    pub fn unknown() -> Self {
        DataSpecification::default()
    }

    pub fn is_complete(&self) -> bool {
        self.cdc.is_some() && self.btype.is_some()
    }
}

/// First template of kind `tag` (`LNodeType`, `DOType`, ...) with the given `id`.
pub fn find_template(doc: &SclDocument, tag: &str, id: &str) -> Option<ElementId> {
    doc.children_by_tag(doc.root(), "DataTypeTemplates")
        .flat_map(|templates| doc.children(templates).iter().copied())
        .find(|t| doc.tag(*t) == tag && doc.attr(*t, "id") == Some(id))
}

/// Resolves `do_path` (e.g. `Pos` or `A.phsA`) from the LN's `lnType` down to its `DOType`.
pub fn resolve_do_type(doc: &SclDocument, any_ln: ElementId, do_path: &str) -> Option<ElementId> {
    let segments = split_path(do_path);
    if segments.is_empty() {
        return None;
    }
    let ln_type = doc.attr(any_ln, "lnType")?;
    let mut leaf = find_template(doc, "LNodeType", ln_type)?;
    for name in segments {
        let data_object = doc.child_with_attr(leaf, &["DO", "SDO"], "name", name)?;
        let do_type = doc.attr(data_object, "type")?;
        leaf = find_template(doc, "DOType", do_type)?;
    }
    Some(leaf)
}

/// Terminal `DA`/`BDA` template element of `do_path` + `da_path`.
pub fn resolve_data_attribute(
    doc: &SclDocument,
    any_ln: ElementId,
    do_path: &str,
    da_path: &str,
) -> Option<ElementId> {
    let mut leaf = resolve_do_type(doc, any_ln, do_path)?;
    let segments = split_path(da_path);
    let last = segments.len().checked_sub(1)?;
    for (index, name) in segments.into_iter().enumerate() {
        let data_attribute = doc.child_with_attr(leaf, &["DA", "BDA"], "name", name)?;
        if index == last {
            return Some(data_attribute);
        }
        let da_type = doc.attr(data_attribute, "type")?;
        leaf = find_template(doc, "DAType", da_type)?;
    }
    None
}

/// `cdc` of the data object and `bType` of the attribute at the given paths.
///
/// Both fields are `None` as soon as either end cannot be resolved.
pub fn resolve_data_path(
    doc: &SclDocument,
    any_ln: ElementId,
    do_path: &str,
    da_path: &str,
) -> DataSpecification {
    let Some(do_type) = resolve_do_type(doc, any_ln, do_path) else {
        return DataSpecification::unknown();
    };
    let Some(cdc) = doc.attr(do_type, "cdc") else {
        return DataSpecification::unknown();
    };
    let btype = resolve_data_attribute(doc, any_ln, do_path, da_path)
        .and_then(|da| doc.attr(da, "bType"));
    match btype {
        Some(btype) => DataSpecification {
            cdc: Some(cdc.to_string()),
            btype: Some(btype.to_string()),
        },
        None => DataSpecification::unknown(),
    }
}

/// Literal values of an `Enum` attribute, in `EnumVal` order.
pub fn resolve_enum_values(
    doc: &SclDocument,
    any_ln: ElementId,
    do_path: &str,
    da_path: &str,
) -> Option<Vec<String>> {
    let da = resolve_data_attribute(doc, any_ln, do_path, da_path)?;
    if doc.attr(da, "bType") != Some("Enum") {
        return None;
    }
    let enum_type = find_template(doc, "EnumType", doc.attr(da, "type")?)?;
    Some(
        doc.children_by_tag(enum_type, "EnumVal")
            .map(|v| doc.text(v).trim().to_string())
            .collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const DOC: &str = r#"<SCL>
        <IED name="IED1"><AccessPoint name="P1"><Server><LDevice inst="CB1">
            <LN lnClass="XCBR" inst="1" lnType="XCBR_T"/>
            <LN lnClass="MMXU" inst="1" lnType="MMXU_T"/>
            <LN lnClass="XSWI" inst="1" lnType="MISSING"/>
        </LDevice></Server></AccessPoint></IED>
        <DataTypeTemplates>
            <LNodeType id="XCBR_T" lnClass="XCBR">
                <DO name="Pos" type="DPC_T"/>
                <DO name="Loc" type="NOTYPE"/>
                <DO name="Blk"/>
            </LNodeType>
            <LNodeType id="MMXU_T" lnClass="MMXU"><DO name="A" type="WYE_T"/></LNodeType>
            <DOType id="DPC_T" cdc="DPC">
                <DA name="stVal" bType="Dbpos" fc="ST"/>
                <DA name="origin" bType="Struct" type="Originator_T" fc="ST"/>
                <DA name="ctlModel" bType="Enum" type="CtlModels" fc="CF"/>
            </DOType>
            <DOType id="WYE_T" cdc="WYE"><SDO name="phsA" type="CMV_T"/></DOType>
            <DOType id="CMV_T" cdc="CMV"><DA name="cVal" bType="Struct" type="Vector_T" fc="MX"/></DOType>
            <DAType id="Originator_T"><BDA name="orCat" bType="Enum" type="orCat"/><BDA name="orIdent" bType="Octet64"/></DAType>
            <DAType id="Vector_T"><BDA name="mag" bType="Struct" type="AV_T"/></DAType>
            <DAType id="AV_T"><BDA name="f" bType="FLOAT32"/></DAType>
            <EnumType id="CtlModels"><EnumVal ord="0">status-only</EnumVal><EnumVal ord="1">direct-with-normal-security</EnumVal></EnumType>
        </DataTypeTemplates>
    </SCL>"#;

    fn ln(doc: &SclDocument, class: &str) -> ElementId {
        doc.descendants_by_tag(doc.root(), &["LN"])
            .into_iter()
            .find(|e| doc.attr(*e, "lnClass") == Some(class))
            .unwrap()
    }

    fn spec(cdc: &str, btype: &str) -> DataSpecification {
        DataSpecification {
            cdc: Some(cdc.to_string()),
            btype: Some(btype.to_string()),
        }
    }

    #[test]
    fn test_resolve_simple_and_nested_paths() {
        let doc = SclDocument::parse_str(DOC).unwrap();
        let xcbr = ln(&doc, "XCBR");
        assert_eq!(resolve_data_path(&doc, xcbr, "Pos", "stVal"), spec("DPC", "Dbpos"));
        assert_eq!(resolve_data_path(&doc, xcbr, "Pos", "origin.orIdent"), spec("DPC", "Octet64"));

        let mmxu = ln(&doc, "MMXU");
        assert_eq!(resolve_data_path(&doc, mmxu, "A.phsA", "cVal.mag.f"), spec("CMV", "FLOAT32"));
    }

    #[test]
    fn test_resolution_is_deterministic() {
        let doc = SclDocument::parse_str(DOC).unwrap();
        let mmxu = ln(&doc, "MMXU");
        let first = resolve_data_path(&doc, mmxu, "A.phsA", "cVal.mag.f");
        let second = resolve_data_path(&doc, mmxu, "A.phsA", "cVal.mag.f");
        assert_eq!(first, second);
    }

    #[test]
    fn test_broken_links_degrade_to_unknown() {
        let doc = SclDocument::parse_str(DOC).unwrap();
        let xcbr = ln(&doc, "XCBR");
        /* DO without type attribute */
        assert_eq!(resolve_data_path(&doc, xcbr, "Blk", "stVal"), DataSpecification::unknown());
        /* dangling DOType reference */
        assert_eq!(resolve_data_path(&doc, xcbr, "Loc", "stVal"), DataSpecification::unknown());
        /* unknown DA */
        assert_eq!(resolve_data_path(&doc, xcbr, "Pos", "q"), DataSpecification::unknown());
        /* intermediate BDA chain breaks */
        assert_eq!(resolve_data_path(&doc, xcbr, "Pos", "origin.orCat.x"), DataSpecification::unknown());
        /* dangling lnType */
        let xswi = ln(&doc, "XSWI");
        assert_eq!(resolve_data_path(&doc, xswi, "Pos", "stVal"), DataSpecification::unknown());
        /* empty paths */
        assert_eq!(resolve_data_path(&doc, xcbr, "", "stVal"), DataSpecification::unknown());
        assert_eq!(resolve_data_path(&doc, xcbr, "Pos", ""), DataSpecification::unknown());
    }

    #[test]
    fn test_resolve_enum_values() {
        let doc = SclDocument::parse_str(DOC).unwrap();
        let xcbr = ln(&doc, "XCBR");
        assert_eq!(
            resolve_enum_values(&doc, xcbr, "Pos", "ctlModel"),
            Some(vec![
                "status-only".to_string(),
                "direct-with-normal-security".to_string()
            ])
        );
        assert_eq!(resolve_enum_values(&doc, xcbr, "Pos", "stVal"), None);
        /* Enum attribute whose EnumType is missing */
        assert_eq!(resolve_enum_values(&doc, xcbr, "Pos", "origin.orCat"), None);
    }
}
