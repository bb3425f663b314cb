//! Lookup-backed template functions
//!
//! Every helper goes through the render's [`LookupProvider`]. With the null
//! provider each one yields its empty value, so templates render offline
//! without guards. A connectivity failure is remembered here and surfaces
//! from the engine as a fatal error once the render unwinds.

use std::sync::{Arc, Mutex};

use cairn_node::{LookupProvider, NodeError, Resource, Result};
use minijinja::{Environment, Error, ErrorKind, Value};
use serde::Serialize;
use serde_json::{Value as JsonValue, json};

use crate::filters::compile_regex;

/// Link names that belong to physical NICs
const PHYSICAL_LINK_PATTERN: &str = "^(eno|eth|enp|enx|ens)";

/// The route with an empty destination and a gateway
#[derive(Debug, Clone, PartialEq)]
pub struct DefaultRoute {
    pub gateway: String,
    pub link: String,
    pub family: String,
}

/// One block device as seen by templates
#[derive(Debug, Clone, Serialize)]
pub struct DiskInfo {
    pub device_name: String,
    pub model: String,
    pub serial: String,
    pub wwid: String,
    pub size: u64,
    pub transport: String,
    pub system_disk: bool,
}

/// A physical network link as seen by templates
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkInfo {
    pub id: String,
    pub predictable_name: String,
    pub hardware_addr: String,
    pub bus_path: String,
    pub driver: String,
    pub vendor: String,
    pub product: String,
}

fn text(spec: &JsonValue, key: &str) -> String {
    match &spec[key] {
        JsonValue::String(s) => s.clone(),
        JsonValue::Null => String::new(),
        other => other.to_string(),
    }
}

fn strings(value: &JsonValue) -> Vec<String> {
    value
        .as_array()
        .map(|items| items.iter().filter_map(|v| v.as_str().map(str::to_string)).collect())
        .unwrap_or_default()
}

/// Predictable interface name for a MAC address: `enx` plus the bare hex digits
pub fn predictable_name(hardware_addr: &str) -> String {
    format!("enx{}", hardware_addr.replace(':', "").to_lowercase())
}

/// Node facts for one render
#[derive(Clone)]
pub struct Discovery {
    provider: Arc<dyn LookupProvider>,
    floating_ip: Option<String>,
    failure: Arc<Mutex<Option<NodeError>>>,
}

impl Discovery {
    pub fn new(provider: Arc<dyn LookupProvider>) -> Self {
        Self {
            provider,
            floating_ip: None,
            failure: Arc::new(Mutex::new(None)),
        }
    }

    /// Shared address excluded from the discovered address list
    pub fn with_floating_ip(mut self, floating_ip: Option<String>) -> Self {
        self.floating_ip = floating_ip.filter(|ip| !ip.is_empty());
        self
    }

    pub fn is_live(&self) -> bool {
        self.provider.is_live()
    }

    /// The first connectivity failure raised inside a template, if any
    pub fn take_failure(&self) -> Option<NodeError> {
        self.failure
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .take()
    }

    fn record(&self, err: NodeError) -> Error {
        let message = err.to_string();
        let mut slot = self.failure.lock().unwrap_or_else(|p| p.into_inner());
        if slot.is_none() {
            *slot = Some(err);
        }
        Error::new(ErrorKind::InvalidOperation, message)
    }

    /// Raw lookup: one resource, `{"items": [...]}` for an empty id, `{}` when absent
    pub fn lookup(&self, kind: &str, namespace: &str, id: &str) -> Result<JsonValue> {
        if id.is_empty() {
            let items: Vec<JsonValue> = self
                .provider
                .list(kind, namespace)?
                .iter()
                .map(Resource::to_json)
                .collect();
            return Ok(json!({ "items": items }));
        }
        Ok(self
            .provider
            .get(kind, namespace, id)?
            .map(|r| r.to_json())
            .unwrap_or_else(|| json!({})))
    }

    fn spec(&self, kind: &str, id: &str) -> Result<Option<JsonValue>> {
        Ok(self.provider.get(kind, "", id)?.map(|r| r.spec))
    }

    pub fn hostname(&self) -> Result<String> {
        Ok(self
            .spec("hostname", "hostname")?
            .map(|spec| text(&spec, "hostname"))
            .unwrap_or_default())
    }

    /// `init`, `controlplane` or `worker`; empty offline
    pub fn machine_type(&self) -> Result<String> {
        Ok(match self.spec("machinetype", "machine-type")? {
            Some(JsonValue::String(role)) => role,
            Some(spec) => text(&spec, "machineType"),
            None => String::new(),
        })
    }

    /// Block devices in enumeration order, the system disk flagged
    pub fn disks(&self) -> Result<Vec<DiskInfo>> {
        let system_id = self
            .spec("systemdisk", "system-disk")?
            .map(|spec| text(&spec, "diskID"))
            .unwrap_or_default();

        Ok(self
            .provider
            .list("disks", "")?
            .into_iter()
            .map(|disk| {
                let spec = &disk.spec;
                let device_name = match text(spec, "dev_path") {
                    path if path.is_empty() => format!("/dev/{}", disk.id()),
                    path => path,
                };
                DiskInfo {
                    system_disk: (!system_id.is_empty() && disk.id() == system_id)
                        || spec["system_disk"].as_bool().unwrap_or(false),
                    device_name,
                    model: text(spec, "model"),
                    serial: text(spec, "serial"),
                    wwid: text(spec, "wwid"),
                    size: spec["size"].as_u64().unwrap_or(0),
                    transport: text(spec, "transport"),
                }
            })
            .collect())
    }

    /// First flagged system disk, else the first disk, else ""
    pub fn system_disk(&self) -> Result<String> {
        let disks = self.disks()?;
        Ok(disks
            .iter()
            .find(|d| d.system_disk)
            .or_else(|| disks.first())
            .map(|d| d.device_name.clone())
            .unwrap_or_default())
    }

    /// When several routes qualify the last one listed wins
    pub fn default_route(&self) -> Result<Option<DefaultRoute>> {
        Ok(self
            .provider
            .list("routes", "")?
            .iter()
            .filter(|r| text(&r.spec, "dst").is_empty() && !text(&r.spec, "gateway").is_empty())
            .last()
            .map(|r| DefaultRoute {
                gateway: text(&r.spec, "gateway"),
                link: text(&r.spec, "outLinkName"),
                family: text(&r.spec, "family"),
            }))
    }

    pub fn default_gateway(&self) -> Result<String> {
        Ok(self.default_route()?.map(|r| r.gateway).unwrap_or_default())
    }

    pub fn default_link_name(&self) -> Result<String> {
        Ok(self.default_route()?.map(|r| r.link).unwrap_or_default())
    }

    /// Device selector for the default link: `hardwareAddr` and `driver`
    pub fn default_link(&self) -> Result<JsonValue> {
        let Some(route) = self.default_route()? else {
            return Ok(json!({}));
        };
        Ok(match self.spec("links", &route.link)? {
            Some(spec) => json!({
                "hardwareAddr": text(&spec, "hardwareAddr"),
                "driver": text(&spec, "driver"),
            }),
            None => json!({}),
        })
    }

    /// Addresses (CIDR notation) on the default link in the default route's
    /// family, without host-scoped ones and without the floating IP
    pub fn default_addresses(&self) -> Result<Vec<String>> {
        let Some(route) = self.default_route()? else {
            return Ok(Vec::new());
        };
        let floating = self.floating_ip.as_ref().map(|ip| format!("{ip}/"));

        Ok(self
            .provider
            .list("addresses", "")?
            .iter()
            .filter(|a| {
                text(&a.spec, "linkName") == route.link
                    && text(&a.spec, "family") == route.family
                    && text(&a.spec, "scope") != "host"
            })
            .map(|a| text(&a.spec, "address"))
            .filter(|address| !floating.as_ref().is_some_and(|f| address.starts_with(f)))
            .collect())
    }

    /// Addresses the node reports as its own
    pub fn node_addresses(&self) -> Result<Vec<String>> {
        Ok(self
            .spec("nodeaddress", "default")?
            .map(|spec| strings(&spec["addresses"]))
            .unwrap_or_default())
    }

    pub fn resolvers(&self) -> Result<Vec<String>> {
        Ok(self
            .spec("resolvers", "resolvers")?
            .map(|spec| strings(&spec["dnsServers"]))
            .unwrap_or_default())
    }

    /// Links with a bus path whose name looks like a physical NIC
    pub fn physical_links(&self) -> Result<Vec<LinkInfo>> {
        let pattern = compile_regex(PHYSICAL_LINK_PATTERN)
            .map_err(|e| NodeError::InvalidConfig(e.to_string()))?;

        Ok(self
            .provider
            .list("links", "")?
            .iter()
            .filter(|l| !text(&l.spec, "busPath").is_empty() && pattern.is_match(l.id()))
            .map(|l| {
                let hardware_addr = text(&l.spec, "hardwareAddr");
                LinkInfo {
                    id: l.id().to_string(),
                    predictable_name: predictable_name(&hardware_addr),
                    hardware_addr,
                    bus_path: text(&l.spec, "busPath"),
                    driver: text(&l.spec, "driver"),
                    vendor: text(&l.spec, "vendor"),
                    product: text(&l.spec, "product"),
                }
            })
            .collect())
    }

    /// `enx<mac>` for a link id; an unknown id is taken to be a MAC address
    pub fn predictable_link_name(&self, id: &str) -> Result<String> {
        let hardware_addr = self
            .spec("links", id)?
            .map(|spec| text(&spec, "hardwareAddr"))
            .filter(|mac| !mac.is_empty())
            .unwrap_or_else(|| id.to_string());
        Ok(predictable_name(&hardware_addr))
    }

    /// Register `lookup` and the `discovered_*` helpers
    pub fn register(&self, env: &mut Environment<'static>) {
        macro_rules! helper {
            ($name:literal, |$d:ident| $body:expr) => {{
                let $d = self.clone();
                env.add_function($name, move || -> std::result::Result<Value, Error> {
                    $body
                        .map(|v| Value::from_serialize(&v))
                        .map_err(|e| $d.record(e))
                });
            }};
        }

        let d = self.clone();
        env.add_function(
            "lookup",
            move |kind: String, namespace: Option<String>, id: Option<String>| {
                d.lookup(&kind, namespace.as_deref().unwrap_or(""), id.as_deref().unwrap_or(""))
                    .map(|v| Value::from_serialize(&v))
                    .map_err(|e| d.record(e))
            },
        );

        let d = self.clone();
        env.add_function("predictable_link_name", move |id: String| {
            d.predictable_link_name(&id).map_err(|e| d.record(e))
        });

        helper!("discovered_hostname", |d| d.hostname());
        helper!("discovered_machine_type", |d| d.machine_type());
        helper!("discovered_disks", |d| d.disks());
        helper!("discovered_system_disk", |d| d.system_disk());
        helper!("discovered_default_gateway", |d| d.default_gateway());
        helper!("discovered_default_link_name", |d| d.default_link_name());
        helper!("discovered_default_link", |d| d.default_link());
        helper!("discovered_default_addresses", |d| d.default_addresses());
        helper!("discovered_node_addresses", |d| d.node_addresses());
        helper!("discovered_resolvers", |d| d.resolvers());
        helper!("discovered_physical_links", |d| d.physical_links());
    }
}
