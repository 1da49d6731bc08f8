//! GOOSE / sampled value subscription core.
//!
//! Read path: [`datatype`] resolves template types, [`compat`] decides
//! compatibility and membership, [`index`] enumerates sources and sinks.
//! Write path: [`SubscriptionEngine`] (in [`mutation`]) builds [`Action`]s,
//! asks [`supervision`] for LGOS/LSVS bookkeeping and hands everything to an
//! [`ActionSink`].
//!
//! [`Action`]: crate::scl::Action

use crate::comdata::EngineCfg;
use crate::scl::{ElementId, SclDocument};
use serde::{Deserialize, Serialize};

pub mod compat;
pub mod datatype;
pub mod event;
pub mod index;
pub mod mutation;
pub mod supervision;

pub use compat::{fcda_specification, input_restriction, is_subscribed_to, unsupported_ext_ref};
pub use datatype::{resolve_data_path, resolve_enum_values, DataSpecification};
pub use event::{ActionSink, ChannelSink, RecordingSink, SubscriptionEvent};
pub use index::SubscriptionCache;
pub use mutation::SubscribeStatus;

/// Kind of control block publishing a data set.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ControlBlockKind {
    Gse,
    SampledValue,
    Report,
    Log,
}

impl ControlBlockKind {
    pub const ALL: [ControlBlockKind; 4] = [
        ControlBlockKind::Log,
        ControlBlockKind::Gse,
        ControlBlockKind::SampledValue,
        ControlBlockKind::Report,
    ];

    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "GSEControl" => Some(ControlBlockKind::Gse),
            "SampledValueControl" => Some(ControlBlockKind::SampledValue),
            "ReportControl" => Some(ControlBlockKind::Report),
            "LogControl" => Some(ControlBlockKind::Log),
            _ => None,
        }
    }

    /// Kind of the control block element `control`, `None` for any other element.
    pub fn of(doc: &SclDocument, control: ElementId) -> Option<Self> {
        ControlBlockKind::from_tag(doc.tag(control))
    }

    pub fn tag(&self) -> &'static str {
        match self {
            ControlBlockKind::Gse => "GSEControl",
            ControlBlockKind::SampledValue => "SampledValueControl",
            ControlBlockKind::Report => "ReportControl",
            ControlBlockKind::Log => "LogControl",
        }
    }

    /// Value of `serviceType`/`pServT` for bindings to this kind.
    pub fn service_type(&self) -> Option<&'static str> {
        match self {
            ControlBlockKind::Gse => Some("GOOSE"),
            ControlBlockKind::SampledValue => Some("SMV"),
            ControlBlockKind::Report => Some("Report"),
            ControlBlockKind::Log => None,
        }
    }

    /// Kinds a sink with the given `serviceType` may be bound through.
    /// A sink without `serviceType` may come from any of them, an unknown
    /// value from none.
    pub fn for_service_type(service_type: Option<&str>) -> &'static [ControlBlockKind] {
        match service_type {
            None => &ControlBlockKind::ALL,
            Some("GOOSE") => &[ControlBlockKind::Gse],
            Some("SMV") => &[ControlBlockKind::SampledValue],
            Some("Report") => &[ControlBlockKind::Report],
            Some(_) => &[],
        }
    }

    /// `lnClass` of the supervision LN watching this kind of stream.
    pub fn supervision_class(&self) -> Option<&'static str> {
        match self {
            ControlBlockKind::Gse => Some("LGOS"),
            ControlBlockKind::SampledValue => Some("LSVS"),
            _ => None,
        }
    }

    /// Data object of the supervision LN holding the watched reference.
    pub fn supervision_do(&self) -> Option<&'static str> {
        match self {
            ControlBlockKind::Gse => Some("GoCBRef"),
            ControlBlockKind::SampledValue => Some("SvCBRef"),
            _ => None,
        }
    }

    /// `Services > SupSubscription` attribute limiting supervisions of this kind.
    pub fn supervision_capacity_attr(&self) -> Option<&'static str> {
        match self {
            ControlBlockKind::Gse => Some("maxGo"),
            ControlBlockKind::SampledValue => Some("maxSv"),
            _ => None,
        }
    }
}

/// What the user picked last in the later binding views.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Selection {
    pub ext_ref: Option<ElementId>,
    pub control: Option<ElementId>,
    pub fcda: Option<ElementId>,
}

/// Subscription front end: configuration, derived caches and the current
/// selection. It never touches the document; every change leaves through an
/// [`ActionSink`].
#[derive(Debug, Default)]
pub struct SubscriptionEngine {
    pub(crate) cfg: EngineCfg,
    pub(crate) cache: SubscriptionCache,
    pub(crate) selection: Selection,
}

impl SubscriptionEngine {
    pub fn new(cfg: EngineCfg) -> Self {
        SubscriptionEngine {
            cfg,
            cache: SubscriptionCache::default(),
            selection: Selection::default(),
        }
    }

    pub fn cfg(&self) -> &EngineCfg {
        &self.cfg
    }

    pub fn selection(&self) -> Selection {
        self.selection
    }

    pub fn cache(&mut self) -> &mut SubscriptionCache {
        &mut self.cache
    }

    /// Number of later binding sinks bound to `fcda` of `control`, cached per document state.
    pub fn fcda_usage_count(&mut self, doc: &SclDocument, control: ElementId, fcda: ElementId) -> usize {
        self.cache.fcda_usage_count(doc, control, fcda)
    }

    /// Supervision LN watching the control block `ext_ref` is bound to.
    pub fn existing_supervision(&mut self, doc: &SclDocument, ext_ref: ElementId) -> Option<ElementId> {
        supervision::existing_supervision(doc, &mut self.cache, ext_ref)
    }
}
