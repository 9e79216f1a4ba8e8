//! Decoded trace events and typed payload access
//!
//! The trace decoder (ETL/ETLX/nettrace) lives outside this crate. What reaches
//! the engine is a time-ordered sequence of [`TraceEvent`] records whose payload
//! is a loosely typed key/value map. Every field read goes through a typed
//! accessor returning [`EventError`], so a malformed event is an ordinary
//! `Err` the correlator can count and drop.

use crate::error::EventError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Provider names
pub mod provider {
    pub const IIS: &str = "IIS_Trace";
    pub const DIAGNOSTIC_SOURCE: &str = "Microsoft-Diagnostics-DiagnosticSource";
    pub const DOTNET_RUNTIME: &str = "Microsoft-Windows-DotNETRuntime";
    pub const KERNEL: &str = "Windows Kernel";
    pub const KERNEL_FILE: &str = "Microsoft-Windows-Kernel-File";
    pub const FUNCTIONS_LOGS: &str = "FunctionsSystemLogsEventSource";
    pub const WEB_SITES: &str = "Microsoft-Windows-WebSites";
}

/// A single decoded trace event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceEvent {
    /// Relative timestamp in milliseconds (non-decreasing within a feed)
    pub timestamp: f64,
    pub provider_name: String,
    pub event_name: String,
    pub process_id: u32,
    #[serde(default)]
    pub process_name: String,
    #[serde(default)]
    pub payload: Payload,
}

impl TraceEvent {
    pub fn new(
        timestamp: f64,
        provider_name: impl Into<String>,
        event_name: impl Into<String>,
        process_id: u32,
        process_name: impl Into<String>,
    ) -> Self {
        Self {
            timestamp,
            provider_name: provider_name.into(),
            event_name: event_name.into(),
            process_id,
            process_name: process_name.into(),
            payload: Payload::default(),
        }
    }

    /// Builder-style payload field
    pub fn with(mut self, field: &str, value: impl Into<PayloadValue>) -> Self {
        self.payload.insert(field, value.into());
        self
    }

    pub fn kind(&self) -> Option<EventKind> {
        EventKind::classify(&self.provider_name, &self.event_name)
    }

    /// `name(pid)` label used by the CPU ranking and rundown command lines
    pub fn process_label(&self) -> String {
        format!("{}({})", self.process_name, self.process_id)
    }
}

/// Loosely typed payload value as produced by the decoder
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PayloadValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    List(Vec<PayloadValue>),
    Map(BTreeMap<String, PayloadValue>),
}

impl PayloadValue {
    /// Case-insensitive substring search through this value and its children.
    /// `needle_lower` must already be lowercase.
    pub fn contains_text(&self, needle_lower: &str) -> bool {
        match self {
            PayloadValue::Null => false,
            PayloadValue::List(items) => items.iter().any(|v| v.contains_text(needle_lower)),
            PayloadValue::Map(map) => map.values().any(|v| v.contains_text(needle_lower)),
            scalar => scalar.to_string().to_lowercase().contains(needle_lower),
        }
    }
}

impl fmt::Display for PayloadValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PayloadValue::Null => Ok(()),
            PayloadValue::Bool(b) => write!(f, "{}", b),
            PayloadValue::Int(i) => write!(f, "{}", i),
            PayloadValue::Float(x) => write!(f, "{}", x),
            PayloadValue::Str(s) => f.write_str(s),
            PayloadValue::List(items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                f.write_str("]")
            }
            PayloadValue::Map(map) => {
                f.write_str("{")?;
                for (i, (k, v)) in map.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}: {}", k, v)?;
                }
                f.write_str("}")
            }
        }
    }
}

impl From<&str> for PayloadValue {
    fn from(s: &str) -> Self {
        PayloadValue::Str(s.to_string())
    }
}

impl From<String> for PayloadValue {
    fn from(s: String) -> Self {
        PayloadValue::Str(s)
    }
}

impl From<i64> for PayloadValue {
    fn from(i: i64) -> Self {
        PayloadValue::Int(i)
    }
}

impl From<i32> for PayloadValue {
    fn from(i: i32) -> Self {
        PayloadValue::Int(i64::from(i))
    }
}

impl From<u32> for PayloadValue {
    fn from(i: u32) -> Self {
        PayloadValue::Int(i64::from(i))
    }
}

impl From<f64> for PayloadValue {
    fn from(x: f64) -> Self {
        PayloadValue::Float(x)
    }
}

impl From<bool> for PayloadValue {
    fn from(b: bool) -> Self {
        PayloadValue::Bool(b)
    }
}

impl From<Vec<PayloadValue>> for PayloadValue {
    fn from(items: Vec<PayloadValue>) -> Self {
        PayloadValue::List(items)
    }
}

/// Field name → value map with typed accessors
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Payload(BTreeMap<String, PayloadValue>);

impl Payload {
    pub fn insert(&mut self, field: &str, value: PayloadValue) {
        self.0.insert(field.to_string(), value);
    }

    /// Raw access; `Null` counts as missing
    pub fn field(&self, field: &str) -> Result<&PayloadValue, EventError> {
        match self.0.get(field) {
            None | Some(PayloadValue::Null) => Err(EventError::missing(field)),
            Some(v) => Ok(v),
        }
    }

    pub fn str_field(&self, field: &str) -> Result<&str, EventError> {
        match self.field(field)? {
            PayloadValue::Str(s) => Ok(s),
            _ => Err(EventError::mismatch(field, "string")),
        }
    }

    /// Integers, integral floats and numeric strings are all accepted
    pub fn i64_field(&self, field: &str) -> Result<i64, EventError> {
        match self.field(field)? {
            PayloadValue::Int(i) => Ok(*i),
            PayloadValue::Float(x) if x.fract() == 0.0 => Ok(*x as i64),
            PayloadValue::Str(s) => s
                .trim()
                .parse()
                .map_err(|_| EventError::mismatch(field, "integer")),
            _ => Err(EventError::mismatch(field, "integer")),
        }
    }

    pub fn f64_field(&self, field: &str) -> Result<f64, EventError> {
        match self.field(field)? {
            PayloadValue::Float(x) => Ok(*x),
            PayloadValue::Int(i) => Ok(*i as f64),
            PayloadValue::Str(s) => s
                .trim()
                .parse()
                .map_err(|_| EventError::mismatch(field, "float")),
            _ => Err(EventError::mismatch(field, "float")),
        }
    }

    /// Any scalar rendered as text; lists and maps are rejected
    pub fn text_field(&self, field: &str) -> Result<String, EventError> {
        match self.field(field)? {
            PayloadValue::List(_) | PayloadValue::Map(_) => {
                Err(EventError::mismatch(field, "scalar"))
            }
            scalar => Ok(scalar.to_string()),
        }
    }

    /// Text of a field if present, empty string otherwise
    pub fn text_or_empty(&self, field: &str) -> String {
        self.text_field(field).unwrap_or_default()
    }

    /// GUIDs are compared as lowercase text without braces
    pub fn guid_field(&self, field: &str) -> Result<String, EventError> {
        let raw = self.text_field(field)?;
        Ok(normalize_guid(&raw))
    }

    pub fn list_field(&self, field: &str) -> Result<&[PayloadValue], EventError> {
        match self.field(field)? {
            PayloadValue::List(items) => Ok(items),
            _ => Err(EventError::mismatch(field, "list")),
        }
    }
}

pub fn normalize_guid(raw: &str) -> String {
    raw.trim()
        .trim_start_matches('{')
        .trim_end_matches('}')
        .to_lowercase()
}

/// Every provider/event pair the engine routes on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    RequestStart,
    RequestEnd,
    ActivityStart,
    ActivityStop,
    JitStart,
    JitLoad,
    GcStart,
    GcStop,
    GcAllocationTick,
    AssemblyLoadStart,
    AssemblyLoadStop,
    TypeLoadStart,
    TypeLoadStop,
    RuntimeStart,
    DiskRead,
    HardFault,
    CpuSample,
    ProcessRundown,
    FileCreate,
    HostLogInfo,
    HostLogVerbose,
    OutboundCall,
    ProvisioningSummary,
}

impl EventKind {
    pub fn classify(provider_name: &str, event_name: &str) -> Option<Self> {
        use EventKind::*;
        let kind = match (provider_name, event_name) {
            (provider::IIS, "IISGeneral/GENERAL_REQUEST_START") => RequestStart,
            (provider::IIS, "IISGeneral/GENERAL_REQUEST_END") => RequestEnd,
            (provider::DIAGNOSTIC_SOURCE, "Activity1Start/Start") => ActivityStart,
            (provider::DIAGNOSTIC_SOURCE, "Activity1Stop/Stop") => ActivityStop,
            (provider::DOTNET_RUNTIME, "Method/JittingStarted") => JitStart,
            (provider::DOTNET_RUNTIME, "Method/LoadVerbose") => JitLoad,
            (provider::DOTNET_RUNTIME, "GC/Start") => GcStart,
            (provider::DOTNET_RUNTIME, "GC/Stop") => GcStop,
            (provider::DOTNET_RUNTIME, "GC/AllocationTick") => GcAllocationTick,
            (provider::DOTNET_RUNTIME, "AssemblyLoader/Start") => AssemblyLoadStart,
            (provider::DOTNET_RUNTIME, "AssemblyLoader/Stop") => AssemblyLoadStop,
            (provider::DOTNET_RUNTIME, "TypeLoad/Start") => TypeLoadStart,
            (provider::DOTNET_RUNTIME, "TypeLoad/Stop") => TypeLoadStop,
            (provider::DOTNET_RUNTIME, "Runtime/Start") => RuntimeStart,
            (provider::KERNEL, "DiskIO/Read") => DiskRead,
            (provider::KERNEL, "Memory/HardFault") => HardFault,
            (provider::KERNEL, "PerfInfo/Sample") => CpuSample,
            (provider::KERNEL, "Process/DCStop") => ProcessRundown,
            (provider::KERNEL_FILE, "Create") => FileCreate,
            (provider::FUNCTIONS_LOGS, "RaiseFunctionsEventInfo") => HostLogInfo,
            (provider::FUNCTIONS_LOGS, "RaiseFunctionsEventVerbose") => HostLogVerbose,
            (provider::WEB_SITES, "EventID(65401)") => OutboundCall,
            (provider::WEB_SITES, "EventID(15005)") => ProvisioningSummary,
            _ => return None,
        };
        Some(kind)
    }
}
