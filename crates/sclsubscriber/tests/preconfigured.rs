mod common;

use common::*;
use pretty_assertions::assert_eq;
use sclsubscriber::scl::SclDocument;
use sclsubscriber::subscription::mutation::subscribe_status;
use sclsubscriber::subscription::{ChannelSink, RecordingSink, SubscribeStatus, SubscriptionEngine, SubscriptionEvent};

#[test]
fn test_subscribe_ied_round_trip() {
    let mut doc = station();
    let mut engine = SubscriptionEngine::default();
    let mut sink = RecordingSink::new();
    let s1 = named(&doc, "SampledValueControl", "S1");
    let ied3 = named(&doc, "IED", "IED3");
    assert_eq!(subscribe_status(&doc, s1, ied3), SubscribeStatus::None);

    engine.subscribe_ied(&doc, &mut sink, s1, ied3);
    apply_all(&mut doc, &mut sink);
    assert_eq!(subscribe_status(&doc, s1, ied3), SubscribeStatus::Full);

    let new_ext_refs = doc.descendants_by_tag(ied3, &["ExtRef"]);
    assert_eq!(new_ext_refs.len(), 2);
    for e in &new_ext_refs {
        assert!(!doc.has_attr(*e, "intAddr"));
        assert_eq!(doc.attr(*e, "serviceType"), Some("SMV"));
        assert_eq!(doc.attr(*e, "srcCBName"), Some("S1"));
    }

    /* nothing left to add */
    engine.subscribe_ied(&doc, &mut sink, s1, ied3);
    assert!(sink.actions.is_empty());

    engine.unsubscribe_ied(&doc, &mut sink, s1, ied3);
    apply_all(&mut doc, &mut sink);
    assert_eq!(subscribe_status(&doc, s1, ied3), SubscribeStatus::None);
    assert!(doc.descendants_by_tag(ied3, &["Inputs"]).is_empty());
}

#[test]
fn test_subscribe_ied_supervision_lifecycle() {
    let mut doc = station();
    let mut engine = SubscriptionEngine::default();
    let mut sink = RecordingSink::new();
    let g1 = named(&doc, "GSEControl", "G1");
    let ied2 = named(&doc, "IED", "IED2");

    engine.subscribe_ied(&doc, &mut sink, g1, ied2);
    apply_all(&mut doc, &mut sink);
    assert_eq!(subscribe_status(&doc, g1, ied2), SubscribeStatus::Full);
    assert_eq!(supervisions(&doc, ied2, G1_REF).len(), 1);
    /* later binding inputs of CSWI are not touched */
    assert_eq!(doc.descendants_by_tag(ied2, &["ExtRef"]).len(), 6);

    engine.unsubscribe_ied(&doc, &mut sink, g1, ied2);
    apply_all(&mut doc, &mut sink);
    assert_eq!(subscribe_status(&doc, g1, ied2), SubscribeStatus::None);
    assert!(supervisions(&doc, ied2, G1_REF).is_empty());
    assert_eq!(doc.descendants_by_tag(ied2, &["ExtRef"]).len(), 4);
}

#[test]
fn test_unsubscribe_ied_keeps_supervision_in_use() {
    let mut doc = station();
    let mut engine = SubscriptionEngine::default();
    let mut sink = RecordingSink::new();
    let g1 = named(&doc, "GSEControl", "G1");
    let ied2 = named(&doc, "IED", "IED2");

    engine.subscribe_ied(&doc, &mut sink, g1, ied2);
    apply_all(&mut doc, &mut sink);
    let in1 = ext_ref(&doc, "in1");
    engine.subscribe(&doc, &mut sink, in1, Some(g1), Some(fcdas(&doc)[0]));
    apply_all(&mut doc, &mut sink);

    engine.unsubscribe_ied(&doc, &mut sink, g1, ied2);
    apply_all(&mut doc, &mut sink);
    assert_eq!(supervisions(&doc, ied2, G1_REF).len(), 1);
}

#[tokio::test]
async fn test_channel_sink_feeds_applier() {
    let doc = station();
    let s1 = named(&doc, "SampledValueControl", "S1");
    let ied3 = named(&doc, "IED", "IED3");
    let (mut sink, mut action_rx) = ChannelSink::new(16);
    let mut events = sink.subscribe_events();
    let mut engine = SubscriptionEngine::default();

    engine.subscribe_ied(&doc, &mut sink, s1, ied3);
    assert_eq!(sink.dispatched(), 1);
    drop(sink);

    let applier = tokio::spawn(async move {
        let mut doc = doc;
        while let Some(action) = action_rx.recv().await {
            doc.apply(&action)?;
        }
        Ok::<SclDocument, anyhow::Error>(doc)
    });
    let doc = applier.await.unwrap().unwrap();

    assert_eq!(subscribe_status(&doc, s1, ied3), SubscribeStatus::Full);
    assert_eq!(
        events.recv().await.unwrap(),
        SubscriptionEvent::SubscriptionChanged {
            control: Some(s1),
            fcda: None,
        }
    );
}
