use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::capacity::Capacity;
use crate::error::SlotError;

/// A schedulable resource family. Closed enum over the accelerator kinds
/// the console knows how to label, with `Custom` for device-plugin keys
/// outside the built-in vocabulary.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ResourceKind {
    Cpu,
    Mem,
    CudaDevice,
    CudaShares,
    RocmDevice,
    TpuDevice,
    IpuDevice,
    AtomDevice,
    AtomPlusDevice,
    WarboyDevice,
    HyperaccelLpuDevice,
    Custom(String),
}

/// How a slot quantity is denominated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SlotUnit {
    Count,
    Bytes,
}

impl SlotUnit {
    /// Suffix shown next to a converted display value.
    pub fn display_suffix(self) -> &'static str {
        match self {
            SlotUnit::Count => "",
            SlotUnit::Bytes => "GiB",
        }
    }
}

impl ResourceKind {
    pub fn from_key(key: &str) -> Self {
        match key {
            "cpu" => ResourceKind::Cpu,
            "mem" => ResourceKind::Mem,
            "cuda.device" => ResourceKind::CudaDevice,
            "cuda.shares" => ResourceKind::CudaShares,
            "rocm.device" => ResourceKind::RocmDevice,
            "tpu.device" => ResourceKind::TpuDevice,
            "ipu.device" => ResourceKind::IpuDevice,
            "atom.device" => ResourceKind::AtomDevice,
            "atom-plus.device" => ResourceKind::AtomPlusDevice,
            "warboy.device" => ResourceKind::WarboyDevice,
            "hyperaccel-lpu.device" => ResourceKind::HyperaccelLpuDevice,
            other => ResourceKind::Custom(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            ResourceKind::Cpu => "cpu",
            ResourceKind::Mem => "mem",
            ResourceKind::CudaDevice => "cuda.device",
            ResourceKind::CudaShares => "cuda.shares",
            ResourceKind::RocmDevice => "rocm.device",
            ResourceKind::TpuDevice => "tpu.device",
            ResourceKind::IpuDevice => "ipu.device",
            ResourceKind::AtomDevice => "atom.device",
            ResourceKind::AtomPlusDevice => "atom-plus.device",
            ResourceKind::WarboyDevice => "warboy.device",
            ResourceKind::HyperaccelLpuDevice => "hyperaccel-lpu.device",
            ResourceKind::Custom(k) => k,
        }
    }

    /// Byte-denominated kinds convert through GiB for display; everything
    /// else is a plain count. Unknown keys that mention memory are assumed
    /// to be byte-valued.
    pub fn unit(&self) -> SlotUnit {
        match self {
            ResourceKind::Mem => SlotUnit::Bytes,
            ResourceKind::Custom(k) if k.contains("mem") => SlotUnit::Bytes,
            _ => SlotUnit::Count,
        }
    }

    /// Short label used in grid headers and progress bars.
    pub fn label(&self) -> &str {
        match self {
            ResourceKind::Cpu => "CPU",
            ResourceKind::Mem => "RAM",
            ResourceKind::CudaDevice => "GPU",
            ResourceKind::CudaShares => "FGPU",
            ResourceKind::RocmDevice => "ROCm GPU",
            ResourceKind::TpuDevice => "TPU",
            ResourceKind::IpuDevice => "IPU",
            ResourceKind::AtomDevice => "ATOM",
            ResourceKind::AtomPlusDevice => "ATOM+",
            ResourceKind::WarboyDevice => "Warboy",
            ResourceKind::HyperaccelLpuDevice => "Hyperaccel LPU",
            ResourceKind::Custom(k) => k,
        }
    }

    /// The built-in vocabulary, in display order.
    pub fn builtins() -> [ResourceKind; 11] {
        [
            ResourceKind::Cpu,
            ResourceKind::Mem,
            ResourceKind::CudaDevice,
            ResourceKind::CudaShares,
            ResourceKind::RocmDevice,
            ResourceKind::TpuDevice,
            ResourceKind::IpuDevice,
            ResourceKind::AtomDevice,
            ResourceKind::AtomPlusDevice,
            ResourceKind::WarboyDevice,
            ResourceKind::HyperaccelLpuDevice,
        ]
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for ResourceKind {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for ResourceKind {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Ok(ResourceKind::from_key(&s))
    }
}

/// What to do with slot keys outside the known vocabulary during
/// normalization.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnknownSlotPolicy {
    Drop,
    Error,
}

/// Explicit missing-key policy. The backend's views disagreed on whether a
/// missing `cpu`/`mem` entry should read as zero or stay absent, so the
/// choice is a parameter here rather than a hidden default.
#[derive(Debug, Clone, Copy)]
pub struct NormalizeOptions {
    pub default_missing_to_zero: bool,
    pub unknown: UnknownSlotPolicy,
}

impl Default for NormalizeOptions {
    fn default() -> Self {
        NormalizeOptions {
            default_missing_to_zero: true,
            unknown: UnknownSlotPolicy::Drop,
        }
    }
}

/// A flat mapping of resource kind to quantity. Two instances exist per
/// entity: occupied (in use) and available (capacity).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourceSlotRecord {
    slots: BTreeMap<ResourceKind, Capacity>,
}

/// Decode a JSON-encoded slot mapping.
///
/// Values may be numbers or numeric strings; sentinel strings become
/// `Capacity::Unlimited`. Byte-valued keys stay in raw byte units here,
/// and absent keys are not filled in. Unit conversion and default-filling
/// are separate, explicit steps.
pub fn parse_slots(raw: &str) -> Result<ResourceSlotRecord, SlotError> {
    let value: serde_json::Value = serde_json::from_str(raw)?;
    let obj = value
        .as_object()
        .ok_or_else(|| SlotError::Parse("slot payload is not an object".into()))?;

    let mut slots = BTreeMap::new();
    for (key, v) in obj {
        let kind = ResourceKind::from_key(key);
        let cap = Capacity::from_json_value(v)?;
        slots.insert(kind, cap);
    }
    Ok(ResourceSlotRecord { slots })
}

impl ResourceSlotRecord {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, kind: ResourceKind, value: Capacity) {
        self.slots.insert(kind, value);
    }

    pub fn get(&self, kind: &ResourceKind) -> Option<Capacity> {
        self.slots.get(kind).copied()
    }

    /// Quantity for `kind`, reading a missing entry as zero. Used by the
    /// aggregation paths where absence means "none occupied".
    pub fn amount(&self, kind: &ResourceKind) -> f64 {
        match self.slots.get(kind) {
            Some(Capacity::Finite(v)) => *v,
            Some(Capacity::Unlimited) => f64::INFINITY,
            None => 0.0,
        }
    }

    pub fn contains(&self, kind: &ResourceKind) -> bool {
        self.slots.contains_key(kind)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ResourceKind, &Capacity)> {
        self.slots.iter()
    }

    pub fn kinds(&self) -> impl Iterator<Item = &ResourceKind> {
        self.slots.keys()
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Re-encode as the wire form: an object with plain decimal string
    /// values, `"Infinity"` for unbounded.
    pub fn to_json_string(&self) -> String {
        serde_json::to_string(&self.slots).unwrap_or_else(|_| "{}".to_string())
    }

    /// Merge `other` into `self`, summing shared kinds. Unlimited absorbs.
    pub fn merge_add(&mut self, other: &ResourceSlotRecord) {
        for (kind, cap) in &other.slots {
            let merged = match self.slots.get(kind) {
                Some(existing) => existing.add(*cap),
                None => *cap,
            };
            self.slots.insert(kind.clone(), merged);
        }
    }

    /// Per-kind remainder after subtracting `used`, clamped at zero.
    /// Kinds present only in `used` contribute nothing.
    pub fn remaining_after(&self, used: &ResourceSlotRecord) -> ResourceSlotRecord {
        let mut out = BTreeMap::new();
        for (kind, cap) in &self.slots {
            out.insert(kind.clone(), cap.sub_clamped(used.amount(kind)));
        }
        ResourceSlotRecord { slots: out }
    }

    /// Whether every quantity in `self` fits inside `capacity`. Kinds the
    /// capacity record lacks count as zero capacity.
    pub fn fits_within(&self, capacity: &ResourceSlotRecord) -> bool {
        self.slots.iter().all(|(kind, cap)| {
            let requested = match cap {
                Capacity::Finite(v) => *v,
                Capacity::Unlimited => f64::INFINITY,
            };
            capacity
                .get(kind)
                .unwrap_or(Capacity::Finite(0.0))
                .admits(requested)
        })
    }

    /// Apply the missing-key and unknown-key policies against the kinds the
    /// cluster actually advertises.
    pub fn normalize(
        mut self,
        known: &[ResourceKind],
        opts: &NormalizeOptions,
    ) -> Result<ResourceSlotRecord, SlotError> {
        let mut unknown = Vec::new();
        self.slots.retain(|kind, _| {
            let keep = known.contains(kind);
            if !keep {
                unknown.push(kind.as_str().to_string());
            }
            keep
        });
        if !unknown.is_empty() && opts.unknown == UnknownSlotPolicy::Error {
            return Err(SlotError::UnknownSlot(unknown.join(", ")));
        }

        if opts.default_missing_to_zero {
            for kind in known {
                self.slots
                    .entry(kind.clone())
                    .or_insert(Capacity::Finite(0.0));
            }
        }
        Ok(self)
    }

    /// Fill kinds absent from this record with `fill`. Policy records use
    /// this to complete `total_resource_slots` against the known vocabulary.
    pub fn filled(mut self, known: &[ResourceKind], fill: Capacity) -> ResourceSlotRecord {
        for kind in known {
            self.slots.entry(kind.clone()).or_insert(fill);
        }
        self
    }
}

impl FromIterator<(ResourceKind, Capacity)> for ResourceSlotRecord {
    fn from_iter<T: IntoIterator<Item = (ResourceKind, Capacity)>>(iter: T) -> Self {
        ResourceSlotRecord {
            slots: iter.into_iter().collect(),
        }
    }
}
