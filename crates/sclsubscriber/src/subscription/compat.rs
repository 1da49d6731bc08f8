//! Sink/source compatibility and subscription matching.

use super::datatype::{resolve_data_path, DataSpecification};
use super::ControlBlockKind;
use crate::scl::{ElementId, SclDocument, SclEdition};
use crate::utils::{ied_name_of, same_attribute_value, same_attribute_value_diff_name};

/// The six attributes an `ExtRef` mirrors from the `FCDA` it is bound to.
pub const FCDA_MIRROR_ATTRS: [&str; 6] = ["ldInst", "prefix", "lnClass", "lnInst", "doName", "daName"];

/// Restriction attributes a vendor may put on a later binding input.
pub const RESTRICTION_ATTRS: [&str; 4] = ["pLN", "pDO", "pDA", "pServT"];

/* matched against `scrPrefix`, not `srcPrefix`: projects in the field were
 * matched with this name and nobody has confirmed which reading is intended */
pub const SRC_PREFIX_MATCH_ATTR: &str = "scrPrefix";

/// Type of the data attribute an `FCDA` points at, resolved in the publishing IED.
pub fn fcda_specification(doc: &SclDocument, fcda: ElementId) -> DataSpecification {
    let (Some(do_name), Some(da_name)) = (doc.attr(fcda, "doName"), doc.attr(fcda, "daName")) else {
        return DataSpecification::unknown();
    };
    let Some(ied) = doc.closest(fcda, &["IED"]) else {
        return DataSpecification::unknown();
    };

    let ld_inst = doc.attr_or_empty(fcda, "ldInst");
    let any_ln = doc
        .descendants_by_tag(ied, &["LDevice"])
        .into_iter()
        .filter(|ld| doc.attr_or_empty(*ld, "inst") == ld_inst)
        .flat_map(|ld| doc.children(ld).iter().copied())
        .filter(|ln| matches!(doc.tag(*ln), "LN0" | "LN"))
        .find(|ln| {
            doc.attr_or_empty(*ln, "prefix") == doc.attr_or_empty(fcda, "prefix")
                && doc.attr_or_empty(*ln, "lnClass") == doc.attr_or_empty(fcda, "lnClass")
                && doc.attr_or_empty(*ln, "inst") == doc.attr_or_empty(fcda, "lnInst")
        });
    match any_ln {
        Some(any_ln) => resolve_data_path(doc, any_ln, do_name, da_name),
        None => DataSpecification::unknown(),
    }
}

/// Type an `ExtRef` accepts, declared through `pLN`/`pDO`/`pDA`.
///
/// Any LN of class `pLN` in the sink's IED may carry the declaration; the
/// first one, in document order, that fully resolves wins.
pub fn input_restriction(doc: &SclDocument, ext_ref: ElementId) -> DataSpecification {
    let (Some(p_ln), Some(p_do), Some(p_da)) = (
        doc.attr(ext_ref, "pLN"),
        doc.attr(ext_ref, "pDO"),
        doc.attr(ext_ref, "pDA"),
    ) else {
        return DataSpecification::unknown();
    };
    let Some(ied) = doc.closest(ext_ref, &["IED"]) else {
        return DataSpecification::unknown();
    };

    doc.descendants_by_tag(ied, &["LN0", "LN"])
        .into_iter()
        .filter(|ln| doc.attr(*ln, "lnClass") == Some(p_ln))
        .map(|ln| resolve_data_path(doc, ln, p_do, p_da))
        .find(DataSpecification::is_complete)
        .unwrap_or_default()
}

/// Whether binding `ext_ref` to `fcda` (published by `control`) must be refused.
///
/// Sinks without the full set of restriction attributes accept anything.
/// Otherwise the check fails closed: no FCDA, unknown types on both sides,
/// a service type other than the control block's, or a CDC/bType mismatch.
pub fn unsupported_ext_ref(
    doc: &SclDocument,
    ext_ref: Option<ElementId>,
    fcda: Option<ElementId>,
    control: Option<ElementId>,
) -> bool {
    let Some(ext_ref) = ext_ref else {
        return false;
    };
    if RESTRICTION_ATTRS.iter().any(|attr| !doc.has_attr(ext_ref, attr)) {
        return false;
    }
    let Some(fcda) = fcda else {
        return true;
    };

    let source = fcda_specification(doc, fcda);
    let input = input_restriction(doc, ext_ref);

    if source.cdc.is_none() && input.cdc.is_none() {
        return true;
    }
    if source.btype.is_none() && input.btype.is_none() {
        return true;
    }
    let service_type = control
        .and_then(|cb| ControlBlockKind::of(doc, cb))
        .and_then(|kind| kind.service_type());
    if service_type != doc.attr(ext_ref, "pServT") {
        return true;
    }

    source.cdc != input.cdc || source.btype != input.btype
}

/// Edition 2 sinks also record which control block they listen to.
fn check_edition_specific_requirements(
    doc: &SclDocument,
    kind: ControlBlockKind,
    control: Option<ElementId>,
    ext_ref: ElementId,
) -> bool {
    if doc.edition() == SclEdition::Ed2003 {
        return true;
    }

    let ld = control.and_then(|cb| doc.closest(cb, &["LDevice"]));
    let ln0 = control.and_then(|cb| doc.closest(cb, &["LN0"]));

    doc.attr_or_empty(ext_ref, "serviceType") == kind.service_type().unwrap_or("")
        && same_attribute_value_diff_name(doc, Some(ext_ref), "srcLDInst", ld, "inst")
        && same_attribute_value_diff_name(doc, Some(ext_ref), SRC_PREFIX_MATCH_ATTR, ln0, "prefix")
        && same_attribute_value_diff_name(doc, Some(ext_ref), "srcLNClass", ln0, "lnClass")
        && same_attribute_value_diff_name(doc, Some(ext_ref), "srcLNInst", ln0, "inst")
        && same_attribute_value_diff_name(doc, Some(ext_ref), "srcCBName", control, "name")
}

/// True when `ext_ref` is bound to `fcda` of `control`.
pub fn is_subscribed_to(
    doc: &SclDocument,
    kind: ControlBlockKind,
    control: Option<ElementId>,
    fcda: Option<ElementId>,
    ext_ref: ElementId,
) -> bool {
    let publisher = fcda.and_then(|f| ied_name_of(doc, f));
    if publisher.is_none() || doc.attr(ext_ref, "iedName") != publisher {
        return false;
    }
    FCDA_MIRROR_ATTRS
        .iter()
        .all(|attr| same_attribute_value(doc, fcda, Some(ext_ref), attr))
        && check_edition_specific_requirements(doc, kind, control, ext_ref)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc_with(version: &str, ext_ref_attrs: &str) -> SclDocument {
        let xml = format!(
            r#"<SCL {version}>
            <IED name="IED1"><AccessPoint name="P1"><Server><LDevice inst="CB1">
                <LN0 lnClass="LLN0" inst="" lnType="LLN0_T">
                    <DataSet name="DS"><FCDA ldInst="CB1" lnClass="XCBR" lnInst="1" doName="Pos" daName="stVal" fc="ST"/></DataSet>
                    <GSEControl name="G1" datSet="DS"/>
                    <SampledValueControl name="S1" datSet="DS"/>
                </LN0>
                <LN lnClass="XCBR" inst="1" lnType="XCBR_T"/>
            </LDevice></Server></AccessPoint></IED>
            <IED name="IED2"><AccessPoint name="P1"><Server><LDevice inst="CTRL">
                <LN lnClass="CSWI" inst="1" lnType="CSWI_T"><Inputs><ExtRef intAddr="in" {ext_ref_attrs}/></Inputs></LN>
                <LN lnClass="XCBR" inst="9" lnType="XCBR_T"/>
            </LDevice></Server></AccessPoint></IED>
            <DataTypeTemplates>
                <LNodeType id="LLN0_T" lnClass="LLN0"/>
                <LNodeType id="CSWI_T" lnClass="CSWI"/>
                <LNodeType id="XCBR_T" lnClass="XCBR"><DO name="Pos" type="DPC_T"/><DO name="Loc" type="SPS_T"/></LNodeType>
                <DOType id="DPC_T" cdc="DPC"><DA name="stVal" bType="Dbpos"/><DA name="q" bType="Quality"/></DOType>
                <DOType id="SPS_T" cdc="SPS"><DA name="stVal" bType="BOOLEAN"/></DOType>
            </DataTypeTemplates></SCL>"#
        );
        SclDocument::parse_str(&xml).unwrap()
    }

    fn first(doc: &SclDocument, tag: &str) -> ElementId {
        doc.descendants_by_tag(doc.root(), &[tag])[0]
    }

    const ED2: &str = r#"version="2007" revision="B" release="4""#;

    #[test]
    fn test_fcda_specification_and_restriction() {
        let doc = doc_with(ED2, r#"pLN="XCBR" pDO="Pos" pDA="stVal" pServT="GOOSE""#);
        let fcda = first(&doc, "FCDA");
        let ext_ref = first(&doc, "ExtRef");
        let expected = DataSpecification {
            cdc: Some("DPC".to_string()),
            btype: Some("Dbpos".to_string()),
        };
        assert_eq!(fcda_specification(&doc, fcda), expected);
        assert_eq!(input_restriction(&doc, ext_ref), expected);
    }

    #[test]
    fn test_unsupported_is_restriction_gated() {
        /* pServT missing: anything goes, even without an FCDA */
        let doc = doc_with(ED2, r#"pLN="XCBR" pDO="Loc" pDA="stVal""#);
        let ext_ref = first(&doc, "ExtRef");
        let fcda = first(&doc, "FCDA");
        let gse = first(&doc, "GSEControl");
        assert!(!unsupported_ext_ref(&doc, Some(ext_ref), Some(fcda), Some(gse)));
        assert!(!unsupported_ext_ref(&doc, Some(ext_ref), None, None));
        assert!(!unsupported_ext_ref(&doc, None, Some(fcda), Some(gse)));
    }

    #[test]
    fn test_unsupported_checks_types_and_service() {
        let doc = doc_with(ED2, r#"pLN="XCBR" pDO="Pos" pDA="stVal" pServT="GOOSE""#);
        let ext_ref = first(&doc, "ExtRef");
        let fcda = first(&doc, "FCDA");
        let gse = first(&doc, "GSEControl");
        let smv = first(&doc, "SampledValueControl");
        assert!(!unsupported_ext_ref(&doc, Some(ext_ref), Some(fcda), Some(gse)));
        assert!(unsupported_ext_ref(&doc, Some(ext_ref), Some(fcda), Some(smv)));
        assert!(unsupported_ext_ref(&doc, Some(ext_ref), None, Some(gse)));

        let doc = doc_with(ED2, r#"pLN="XCBR" pDO="Loc" pDA="stVal" pServT="GOOSE""#);
        let ext_ref = first(&doc, "ExtRef");
        assert!(unsupported_ext_ref(&doc, Some(ext_ref), Some(fcda), Some(gse)));

        /* restriction pointing nowhere and FCDA resolving fine: still a mismatch */
        let doc = doc_with(ED2, r#"pLN="MMXU" pDO="A" pDA="cVal" pServT="GOOSE""#);
        let ext_ref = first(&doc, "ExtRef");
        assert!(unsupported_ext_ref(&doc, Some(ext_ref), Some(fcda), Some(gse)));
    }

    #[test]
    fn test_is_subscribed_to_edition_2() {
        let doc = doc_with(
            ED2,
            r#"iedName="IED1" ldInst="CB1" lnClass="XCBR" lnInst="1" doName="Pos" daName="stVal"
               serviceType="GOOSE" srcLDInst="CB1" srcLNClass="LLN0" srcCBName="G1""#,
        );
        let ext_ref = first(&doc, "ExtRef");
        let fcda = first(&doc, "FCDA");
        let gse = first(&doc, "GSEControl");
        let smv = first(&doc, "SampledValueControl");
        assert!(is_subscribed_to(&doc, ControlBlockKind::Gse, Some(gse), Some(fcda), ext_ref));
        assert!(!is_subscribed_to(&doc, ControlBlockKind::SampledValue, Some(smv), Some(fcda), ext_ref));
        assert!(!is_subscribed_to(&doc, ControlBlockKind::Gse, Some(gse), None, ext_ref));
    }

    #[test]
    fn test_is_subscribed_to_edition_2003_ignores_provenance() {
        let doc = doc_with(
            "",
            r#"iedName="IED1" ldInst="CB1" lnClass="XCBR" lnInst="1" doName="Pos" daName="stVal""#,
        );
        let ext_ref = first(&doc, "ExtRef");
        let fcda = first(&doc, "FCDA");
        let smv = first(&doc, "SampledValueControl");
        assert!(is_subscribed_to(&doc, ControlBlockKind::SampledValue, Some(smv), Some(fcda), ext_ref));

        let doc = doc_with(
            "",
            r#"iedName="IED1" ldInst="CB1" lnClass="XCBR" lnInst="2" doName="Pos" daName="stVal""#,
        );
        let ext_ref = first(&doc, "ExtRef");
        assert!(!is_subscribed_to(&doc, ControlBlockKind::SampledValue, Some(smv), Some(fcda), ext_ref));
    }

    #[test]
    fn test_prefix_is_matched_on_scr_prefix() {
        let doc = doc_with(
            ED2,
            r#"iedName="IED1" ldInst="CB1" lnClass="XCBR" lnInst="1" doName="Pos" daName="stVal"
               serviceType="GOOSE" srcLDInst="CB1" srcLNClass="LLN0" srcCBName="G1" scrPrefix="X""#,
        );
        let ext_ref = first(&doc, "ExtRef");
        let fcda = first(&doc, "FCDA");
        let gse = first(&doc, "GSEControl");
        assert!(!is_subscribed_to(&doc, ControlBlockKind::Gse, Some(gse), Some(fcda), ext_ref));
    }
}
