#![allow(dead_code)]

use sclsubscriber::scl::{ElementId, SclDocument};
use sclsubscriber::subscription::supervision::supervision_reference;
use sclsubscriber::subscription::RecordingSink;

/// IED1 publishes `DS` (XCBR1 Pos.stVal and Pos.q) through G1, G2 and S1.
/// IED2 has four later binding inputs and one free LGOS, IED3 is empty.
pub const STATION: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<SCL xmlns="http://www.iec.ch/61850/2003/SCL" version="2007" revision="B" release="4">
    <Header id="station"/>
    <IED name="IED1">
        <AccessPoint name="P1"><Server><LDevice inst="CB1">
            <LN0 lnClass="LLN0" inst="" lnType="LLN0_T">
                <DataSet name="DS">
                    <FCDA ldInst="CB1" prefix="" lnClass="XCBR" lnInst="1" doName="Pos" daName="stVal" fc="ST"/>
                    <FCDA ldInst="CB1" prefix="" lnClass="XCBR" lnInst="1" doName="Pos" daName="q" fc="ST"/>
                </DataSet>
                <GSEControl name="G1" datSet="DS" appID="G1"/>
                <GSEControl name="G2" datSet="DS" appID="G2"/>
                <SampledValueControl name="S1" datSet="DS" smvID="S1"/>
            </LN0>
            <LN lnClass="XCBR" inst="1" lnType="XCBR_T"/>
        </LDevice></Server></AccessPoint>
    </IED>
    <IED name="IED2">
        <Services><SupSubscription maxGo="4" maxSv="2"/></Services>
        <AccessPoint name="P1"><Server><LDevice inst="LD1">
            <LN0 lnClass="LLN0" inst="" lnType="LLN0_T"/>
            <LN lnClass="CSWI" inst="1" lnType="CSWI_T">
                <Inputs>
                    <ExtRef intAddr="in1" desc="breaker position" pLN="XCBR" pDO="Pos" pDA="stVal" pServT="GOOSE"/>
                    <ExtRef intAddr="in2" pLN="XCBR" pDO="Pos" pDA="stVal" pServT="GOOSE"/>
                    <ExtRef intAddr="in3"/>
                    <ExtRef intAddr="in4" pLN="XCBR" pDO="Pos" pDA="stVal" pServT="SMV"/>
                </Inputs>
            </LN>
            <LN lnClass="XCBR" inst="1" lnType="XCBR_T"/>
            <LN lnClass="LGOS" inst="1" lnType="LGOS_T"/>
        </LDevice></Server></AccessPoint>
    </IED>
    <IED name="IED3">
        <AccessPoint name="P1"><Server><LDevice inst="LD1">
            <LN0 lnClass="LLN0" inst="" lnType="LLN0_T"/>
        </LDevice></Server></AccessPoint>
    </IED>
    <DataTypeTemplates>
        <LNodeType id="LLN0_T" lnClass="LLN0"/>
        <LNodeType id="CSWI_T" lnClass="CSWI"/>
        <LNodeType id="XCBR_T" lnClass="XCBR"><DO name="Pos" type="DPC_T"/></LNodeType>
        <LNodeType id="LGOS_T" lnClass="LGOS"><DO name="GoCBRef" type="ORG_T"/></LNodeType>
        <DOType id="DPC_T" cdc="DPC">
            <DA name="stVal" bType="Dbpos" fc="ST"/>
            <DA name="q" bType="Quality" fc="ST"/>
        </DOType>
        <DOType id="ORG_T" cdc="ORG"><DA name="setSrcRef" bType="ObjRef" fc="SP" valKind="RO"/></DOType>
    </DataTypeTemplates>
</SCL>"#;

pub const G1_REF: &str = "IED1CB1/LLN0.G1";
pub const G2_REF: &str = "IED1CB1/LLN0.G2";

pub fn station() -> SclDocument {
    SclDocument::parse_str(STATION).unwrap()
}

pub fn station_2003() -> SclDocument {
    SclDocument::parse_str(&STATION.replace(r#"version="2007" revision="B" release="4""#, "")).unwrap()
}

pub fn ext_ref(doc: &SclDocument, int_addr: &str) -> ElementId {
    doc.descendants_by_tag(doc.root(), &["ExtRef"])
        .into_iter()
        .find(|e| doc.attr(*e, "intAddr") == Some(int_addr))
        .unwrap()
}

pub fn named(doc: &SclDocument, tag: &str, name: &str) -> ElementId {
    doc.descendants_by_tag(doc.root(), &[tag])
        .into_iter()
        .find(|e| doc.attr(*e, "name") == Some(name))
        .unwrap()
}

/// FCDAs of `DS`: `[Pos.stVal, Pos.q]`.
pub fn fcdas(doc: &SclDocument) -> Vec<ElementId> {
    doc.descendants_by_tag(doc.root(), &["FCDA"])
}

/// Applies and forgets everything the sink collected.
pub fn apply_all(doc: &mut SclDocument, sink: &mut RecordingSink) {
    for action in sink.drain_actions() {
        doc.apply(&action).unwrap();
    }
}

/// LNs of `ied` whose supervision reference is `cb_ref`.
pub fn supervisions(doc: &SclDocument, ied: ElementId, cb_ref: &str) -> Vec<ElementId> {
    doc.descendants_by_tag(ied, &["LN"])
        .into_iter()
        .filter(|ln| supervision_reference(doc, *ln) == Some(cb_ref))
        .collect()
}
