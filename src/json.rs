//! JSON request and response documents.
//!
//! Request:
//!
//! ```json
//! {"fairplay-streaming-request": {"create-ckc": [{
//!     "id": 1,
//!     "spc": "<base64>",
//!     "check-in": false,
//!     "asset-info": [{
//!         "content-key": "3C3C...", "content-iv": "D5FB...",
//!         "lease-duration": 600, "hdcp-type": 0, "content-type": "hd",
//!         "offline-hls": {"stream-id": "...", "title-id": "...",
//!                         "rental-duration": 0, "playback-duration": 0}
//!     }]
//! }]}}
//! ```
//!
//! Response: `{"fairplay-streaming-response": {"create-ckc": [...]}}`, one
//! entry per request entry, in request order.

use base64::Engine;
use serde::Deserialize;
use serde_json::{json, Map, Value};

use crate::asset::{AssetInfo, ContentType, LicenseType};
use crate::constants::{
    HdcpRequirement, AES128_IV_SZ, AES128_KEY_SZ, MAX_STREAM_ID_LENGTH, MAX_TITLE_ID_LENGTH,
    SYNC_FLAG_TITLE_ID_VALID,
};
use crate::error::{Error, Result, Status};
use crate::operation::{Operation, OperationResult};
use crate::server::KeyServer;

pub const REQUEST_ROOT: &str = "fairplay-streaming-request";
pub const RESPONSE_ROOT: &str = "fairplay-streaming-response";
pub const CREATE_CKC: &str = "create-ckc";

#[derive(Debug, Deserialize)]
struct CreateCkcEntry {
    spc: String,
    #[serde(rename = "check-in", default)]
    check_in: bool,
    #[serde(rename = "asset-info", default)]
    asset_info: Vec<AssetInfoEntry>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct AssetInfoEntry {
    content_key: Option<String>,
    content_iv: Option<String>,
    lease_duration: Option<u32>,
    hdcp_type: Option<i64>,
    content_type: Option<String>,
    offline_hls: Option<OfflineHlsEntry>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct OfflineHlsEntry {
    stream_id: Option<String>,
    title_id: Option<String>,
    rental_duration: Option<u32>,
    playback_duration: Option<u32>,
}

/// One entry of the `create-ckc` request array.
///
/// A malformed entry keeps its id so its failure can still be reported.
#[derive(Debug)]
pub struct RequestEntry {
    pub id: u64,
    pub operation: Result<Operation>,
}

/// Parse a request document.
///
/// Fails only when the document itself is unusable; problems inside one
/// entry are reported through that entry.
pub fn parse_request(input: &str) -> Result<Vec<RequestEntry>> {
    let document: Value = serde_json::from_str(input)?;
    let entries = match document
        .get(REQUEST_ROOT)
        .and_then(|root| root.get(CREATE_CKC))
        .and_then(Value::as_array)
    {
        Some(entries) => entries,
        None => fps_bail!(
            Status::ParamErr,
            "request has no {}.{} array",
            REQUEST_ROOT,
            CREATE_CKC
        ),
    };

    Ok(entries
        .iter()
        .map(|entry| {
            let id = parse_id(entry.get("id"));
            RequestEntry {
                id,
                operation: parse_operation(id, entry),
            }
        })
        .collect())
}

/// Ids may be numbers or numeric strings; anything else is 0.
fn parse_id(value: Option<&Value>) -> u64 {
    match value {
        Some(Value::Number(n)) => n.as_u64().unwrap_or(0),
        Some(Value::String(s)) => s.trim().parse().unwrap_or(0),
        _ => 0,
    }
}

fn parse_operation(id: u64, entry: &Value) -> Result<Operation> {
    let entry = CreateCkcEntry::deserialize(entry)?;

    let spc = match base64::engine::general_purpose::STANDARD.decode(entry.spc.trim()) {
        Ok(spc) => spc,
        Err(e) => fps_bail!(Status::ParserErr, "operation {}: invalid SPC base64: {}", id, e),
    };

    // Only one asset per operation; asset info may also come from the database hook.
    let asset_info = match entry.asset_info.into_iter().next() {
        Some(asset) => parse_asset_info(asset)?,
        None => AssetInfo::default(),
    };

    Ok(Operation::new(id, spc, asset_info).with_check_in(entry.check_in))
}

fn parse_asset_info(entry: AssetInfoEntry) -> Result<AssetInfo> {
    let mut asset = AssetInfo {
        is_content_key_provided: entry.content_key.is_some() && entry.content_iv.is_some(),
        ..AssetInfo::default()
    };

    if let Some(key) = entry.content_key.as_deref() {
        asset
            .content_key
            .copy_from_slice(&parse_hex_field(key, AES128_KEY_SZ, "content-key")?);
    }
    if let Some(iv) = entry.content_iv.as_deref() {
        asset
            .content_iv
            .copy_from_slice(&parse_hex_field(iv, AES128_IV_SZ, "content-iv")?);
    }
    if let Some(lease) = entry.lease_duration {
        asset.lease_duration = lease;
    }

    asset.hdcp_requirement = match entry.hdcp_type {
        Some(hdcp_type) => match HdcpRequirement::from_request(hdcp_type) {
            Some(requirement) => requirement,
            None => fps_bail!(Status::ParamErr, "invalid hdcp-type {}", hdcp_type),
        },
        None => {
            debug!("hdcp-type not provided, defaulting to type 0");
            HdcpRequirement::Type0
        }
    };

    asset.content_type = entry
        .content_type
        .as_deref()
        .map(ContentType::from_name)
        .unwrap_or(ContentType::Unknown);

    if let Some(offline) = entry.offline_hls {
        asset.license_type = LicenseType::OfflineHls;
        asset.stream_id = parse_optional_id(offline.stream_id.as_deref())?;
        asset.title_id = parse_optional_id(offline.title_id.as_deref())?;
        asset.rental_duration = offline.rental_duration.unwrap_or(0);
        asset.playback_duration = offline.playback_duration.unwrap_or(0);
        verify_offline_hls(&asset)?;
    }

    Ok(asset)
}

/// Decode a hex field of at most `len` bytes, right padded with zeros.
///
/// A leading `0x` is ignored and an odd digit count gets a leading zero.
fn parse_hex_field(value: &str, len: usize, name: &str) -> Result<Vec<u8>> {
    let mut bytes = decode_hex(value)?;
    fps_ensure!(
        bytes.len() <= len,
        Status::ParamErr,
        "{} is {} bytes, expected at most {}",
        name,
        bytes.len(),
        len
    );
    bytes.resize(len, 0);
    Ok(bytes)
}

fn parse_optional_id(value: Option<&str>) -> Result<Option<Vec<u8>>> {
    match value {
        Some(v) if !v.is_empty() => Ok(Some(decode_hex(v)?)),
        _ => Ok(None),
    }
}

fn decode_hex(value: &str) -> Result<Vec<u8>> {
    let digits = value.trim();
    let digits = digits.strip_prefix("0x").unwrap_or(digits);
    if digits.len() % 2 == 1 {
        Ok(hex::decode(format!("0{}", digits))?)
    } else {
        Ok(hex::decode(digits)?)
    }
}

fn verify_offline_hls(asset: &AssetInfo) -> Result<()> {
    fps_ensure!(
        asset.stream_id.is_some() == asset.title_id.is_some(),
        Status::ParamErr,
        "stream-id and title-id must both be set or both be absent"
    );
    if let Some(stream_id) = &asset.stream_id {
        fps_ensure!(
            stream_id.len() <= MAX_STREAM_ID_LENGTH,
            Status::ParamErr,
            "stream-id is {} bytes",
            stream_id.len()
        );
    }
    if let Some(title_id) = &asset.title_id {
        fps_ensure!(
            title_id.len() <= MAX_TITLE_ID_LENGTH,
            Status::ParamErr,
            "title-id is {} bytes",
            title_id.len()
        );
    }
    Ok(())
}

/// Serialize results into a response document.
#[must_use]
pub fn serialize_results(results: &[OperationResult]) -> Value {
    let entries = results.iter().map(serialize_result).collect::<Vec<_>>();
    json!({
        RESPONSE_ROOT: {
            CREATE_CKC: entries
        }
    })
}

fn serialize_result(result: &OperationResult) -> Value {
    let mut node = Map::new();
    node.insert("id".into(), json!(result.id));
    node.insert("status".into(), json!(result.status.code()));

    if !result.is_ok() {
        return Value::Object(node);
    }

    node.insert("hu".into(), json!(hex::encode_upper(&result.hu)));

    if let Some(check_in) = &result.check_in {
        node.insert(
            "check-in-server-challenge".into(),
            json!(check_in.server_challenge.to_string()),
        );
        if check_in.flags != 0 {
            node.insert("check-in-flags".into(), json!(format!("{:X}", check_in.flags)));
            node.insert(
                "duration-left".into(),
                json!(check_in.duration_to_expiry.to_string()),
            );
            if check_in.flags & SYNC_FLAG_TITLE_ID_VALID != 0 {
                if let Some(title_id) = &check_in.title_id {
                    node.insert("check-in-title-id".into(), json!(hex::encode_upper(title_id)));
                }
            }
            if !check_in.deleted_content_ids.is_empty() {
                let ids = check_in
                    .deleted_content_ids
                    .iter()
                    .map(hex::encode_upper)
                    .collect::<Vec<_>>();
                node.insert("check-in-stream-id".into(), json!(ids));
            }
        }
    }

    if let Some(identity) = &result.device_identity {
        node.insert("fpdi-version".into(), json!(identity.fpdi_version));
        node.insert("device-class".into(), json!(identity.device_class.value()));
        node.insert("vendor-hash".into(), json!(hex::encode_upper(identity.vendor_hash)));
        node.insert("product-hash".into(), json!(hex::encode_upper(identity.product_hash)));
        node.insert("fps-ree-version".into(), json!(format!("{:08X}", identity.ree_version)));
        node.insert("fps-tee-version".into(), json!(format!("{:08X}", identity.tee_version)));
        node.insert("os-version".into(), json!(format!("{:08X}", identity.os_version)));
    }

    if let Some(vm) = &result.vm_device_info {
        node.insert("host-device-class".into(), json!(vm.host_device_class.vm_name()));
        node.insert("host-os-version".into(), json!(format!("{:08X}", vm.host_os_version)));
        node.insert("host-vm-protocol-version".into(), json!(vm.host_vm_protocol_version));
        node.insert("guest-device-class".into(), json!(vm.guest_device_class.vm_name()));
        node.insert("guest-os-version".into(), json!(format!("{:08X}", vm.guest_os_version)));
        node.insert("guest-vm-protocol-version".into(), json!(vm.guest_vm_protocol_version));
    }

    if result.check_in.is_none() && !result.ckc.is_empty() {
        node.insert(
            "ckc".into(),
            json!(base64::engine::general_purpose::STANDARD.encode(&result.ckc)),
        );
    }

    Value::Object(node)
}

/// Build a request document for `operations`.
#[must_use]
pub fn build_request(operations: &[Operation]) -> Value {
    let entries = operations
        .iter()
        .map(|op| {
            json!({
                "id": op.id,
                "spc": base64::engine::general_purpose::STANDARD.encode(&op.spc),
                "check-in": op.is_check_in,
                "asset-info": [asset_info_value(&op.asset_info)]
            })
        })
        .collect::<Vec<_>>();
    json!({
        REQUEST_ROOT: {
            CREATE_CKC: entries
        }
    })
}

fn asset_info_value(asset: &AssetInfo) -> Value {
    let mut node = Map::new();
    if asset.is_content_key_provided {
        node.insert("content-key".into(), json!(hex::encode(asset.content_key)));
        node.insert("content-iv".into(), json!(hex::encode(asset.content_iv)));
    }
    if asset.is_lease_requested() {
        node.insert("lease-duration".into(), json!(asset.lease_duration));
    }
    let hdcp_type = match asset.hdcp_requirement {
        HdcpRequirement::NotRequired => -1,
        HdcpRequirement::Type0 => 0,
        HdcpRequirement::Type1 => 1,
    };
    node.insert("hdcp-type".into(), json!(hdcp_type));
    if asset.content_type != ContentType::Unknown {
        node.insert("content-type".into(), json!(asset.content_type.as_str()));
    }
    if asset.is_offline_hls() {
        let mut offline = Map::new();
        if let Some(stream_id) = &asset.stream_id {
            offline.insert("stream-id".into(), json!(hex::encode(stream_id)));
        }
        if let Some(title_id) = &asset.title_id {
            offline.insert("title-id".into(), json!(hex::encode(title_id)));
        }
        offline.insert("rental-duration".into(), json!(asset.rental_duration));
        offline.insert("playback-duration".into(), json!(asset.playback_duration));
        node.insert("offline-hls".into(), Value::Object(offline));
    }
    Value::Object(node)
}

/// Read the id, status, HU and CKC of each entry of a response document.
pub fn parse_response(response: &Value) -> Result<Vec<OperationResult>> {
    let entries = match response
        .get(RESPONSE_ROOT)
        .and_then(|root| root.get(CREATE_CKC))
        .and_then(Value::as_array)
    {
        Some(entries) => entries,
        None => fps_bail!(
            Status::ParamErr,
            "response has no {}.{} array",
            RESPONSE_ROOT,
            CREATE_CKC
        ),
    };

    entries
        .iter()
        .map(|entry| {
            let id = parse_id(entry.get("id"));
            let code = entry.get("status").and_then(Value::as_i64).unwrap_or(0);
            let mut result = OperationResult::failed(id, Status::from_code(code as i32));
            if let Some(hu) = entry.get("hu").and_then(Value::as_str) {
                result.hu = hex::decode(hu)?;
            }
            if let Some(ckc) = entry.get("ckc").and_then(Value::as_str) {
                result.ckc = base64::engine::general_purpose::STANDARD.decode(ckc)?;
            }
            Ok(result)
        })
        .collect()
}

/// Parse, process and serialize one request document.
///
/// Never fails: an unusable document yields a single `paramErr` entry
/// with id 0.
#[must_use]
pub fn process_request(server: &KeyServer, input: &str) -> Value {
    let entries = match parse_request(input) {
        Ok(entries) => entries,
        Err(e) => {
            warn!("Rejecting request: {}", e);
            let status = match e {
                Error::Fps { status, .. } => status,
                _ => Status::ParamErr,
            };
            return serialize_results(&[OperationResult::failed(0, status)]);
        }
    };

    let mut operations = Vec::new();
    let mut slots = Vec::with_capacity(entries.len());
    for entry in entries {
        match entry.operation {
            Ok(operation) => {
                operations.push(operation);
                slots.push(None);
            }
            Err(e) => slots.push(Some(OperationResult::from_error(entry.id, &e))),
        }
    }

    let mut processed = server.process_operations(&operations).into_iter();
    let results = slots
        .into_iter()
        .map(|slot| match slot {
            Some(rejected) => rejected,
            None => processed
                .next()
                .unwrap_or_else(|| OperationResult::failed(0, Status::InternalErr)),
        })
        .collect::<Vec<_>>();

    serialize_results(&results)
}

#[cfg(test)]
mod tests {
    use base64::Engine;
    use serde_json::{json, Value};

    use super::{build_request, parse_request, parse_response, process_request, serialize_results};
    use crate::asset::{AssetInfo, ContentType, LicenseType};
    use crate::constants::{HdcpRequirement, NO_LEASE_DURATION};
    use crate::error::Status;
    use crate::operation::{CheckIn, Operation, OperationResult};
    use crate::test_support::{server, SpcBuilder};

    fn b64(data: &[u8]) -> String {
        base64::engine::general_purpose::STANDARD.encode(data)
    }

    fn results(response: &Value) -> &Vec<Value> {
        response["fairplay-streaming-response"]["create-ckc"]
            .as_array()
            .expect("create-ckc array")
    }

    #[test]
    fn parse_full_entry() {
        let request = json!({
            "fairplay-streaming-request": {"create-ckc": [{
                "id": "12",
                "spc": b64(b"spc"),
                "asset-info": [{
                    "content-key": "0x0102",
                    "content-iv": "abc",
                    "lease-duration": 600,
                    "hdcp-type": 1,
                    "content-type": "uhd",
                    "offline-hls": {"stream-id": "aa", "title-id": "bb", "rental-duration": 5}
                }]
            }]}
        });
        let entries = parse_request(&request.to_string()).expect("request");
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].id, 12);

        let op = entries[0].operation.as_ref().expect("operation");
        assert_eq!(op.spc, b"spc");
        assert!(!op.is_check_in);
        let asset = &op.asset_info;
        assert!(asset.is_content_key_provided);
        assert_eq!(&asset.content_key[..3], &[1, 2, 0]);
        assert_eq!(&asset.content_iv[..3], &[0x0a, 0xbc, 0]);
        assert_eq!(asset.lease_duration, 600);
        assert_eq!(asset.hdcp_requirement, HdcpRequirement::Type1);
        assert_eq!(asset.content_type, ContentType::Uhd);
        assert_eq!(asset.license_type, LicenseType::OfflineHls);
        assert_eq!(asset.stream_id, Some(vec![0xaa]));
        assert_eq!(asset.rental_duration, 5);
    }

    #[test]
    fn defaults_without_asset_info() {
        let request = json!({
            "fairplay-streaming-request": {"create-ckc": [{"spc": b64(b"x"), "check-in": true}]}
        });
        let entries = parse_request(&request.to_string()).expect("request");
        let op = entries[0].operation.as_ref().expect("operation");
        assert_eq!(op.id, 0);
        assert!(op.is_check_in);
        assert_eq!(op.asset_info.lease_duration, NO_LEASE_DURATION);
        assert_eq!(op.asset_info.hdcp_requirement, HdcpRequirement::Type0);
        assert!(!op.asset_info.is_content_key_provided);
    }

    #[test]
    fn bad_entries_are_isolated() {
        let request = json!({
            "fairplay-streaming-request": {"create-ckc": [
                {"id": 1, "spc": "!!not base64!!"},
                {"id": 2, "spc": b64(b"x"), "asset-info": [{"hdcp-type": 7}]},
                {"id": 3, "spc": b64(b"x"), "asset-info": [{"offline-hls": {"stream-id": "aa"}}]},
                {"id": 4, "spc": b64(b"x"), "asset-info": [{"offline-hls": {
                    "stream-id": "00112233445566778899aabbccddeeff00",
                    "title-id": "01"
                }}]},
                {"id": 5, "spc": b64(b"x"), "asset-info": [{"content-key": "zz"}]},
                {"id": 6},
                {"id": 7, "spc": b64(b"x")}
            ]}
        });
        let entries = parse_request(&request.to_string()).expect("request");
        let statuses = entries
            .iter()
            .map(|e| e.operation.as_ref().err().map(|err| err.status()))
            .collect::<Vec<_>>();
        assert_eq!(
            statuses,
            vec![
                Some(Status::ParserErr),
                Some(Status::ParamErr),
                Some(Status::ParamErr),
                Some(Status::ParamErr),
                Some(Status::ParamErr),
                Some(Status::ParamErr),
                None,
            ]
        );
        assert_eq!(entries[5].id, 6);
    }

    #[test]
    fn unusable_document() {
        for input in ["not json", "{}", r#"{"fairplay-streaming-request": {"create-ckc": 5}}"#] {
            let response = process_request(&server(), input);
            assert_eq!(
                results(&response),
                &vec![json!({"id": 0, "status": -42585})],
                "{}",
                input
            );
        }
    }

    #[test]
    fn failed_result_has_only_id_and_status() {
        let response = serialize_results(&[OperationResult::failed(9, Status::DupTagErr)]);
        assert_eq!(results(&response), &vec![json!({"id": 9, "status": -42591})]);
    }

    #[test]
    fn check_in_result_fields() {
        let mut result = OperationResult::new(4);
        result.ckc = vec![1, 2, 3];
        result.check_in = Some(CheckIn {
            server_challenge: 1234,
            flags: 0x1a,
            title_id: Some(vec![0xab; 16]),
            duration_to_expiry: 60,
            deleted_content_ids: vec![[0x01; 16]],
        });
        let response = serialize_results(&[result]);
        let node = &results(&response)[0];

        assert_eq!(node["hu"], json!("0".repeat(40)));
        assert_eq!(node["check-in-server-challenge"], json!("1234"));
        assert_eq!(node["check-in-flags"], json!("1A"));
        assert_eq!(node["duration-left"], json!("60"));
        assert_eq!(node["check-in-title-id"], json!("AB".repeat(16)));
        assert_eq!(node["check-in-stream-id"], json!(["01".repeat(16)]));
        assert!(node.get("ckc").is_none());
    }

    #[test]
    fn end_to_end_batch() {
        let spc = SpcBuilder::new().build();
        let request = json!({
            "fairplay-streaming-request": {"create-ckc": [
                {"id": 1, "spc": b64(&spc), "asset-info": [{"content-type": "audio"}]},
                {"id": 2, "spc": b64(&spc[..10]), "asset-info": [{"content-type": "audio"}]},
                {"id": 3, "spc": "%%%"},
                {"id": 4, "spc": b64(&spc), "asset-info": [{"content-type": "audio"}]}
            ]}
        });

        let response = process_request(&server(), &request.to_string());
        let nodes = results(&response);
        let summary = nodes
            .iter()
            .map(|n| (n["id"].as_u64().expect("id"), n["status"].as_i64().expect("status")))
            .collect::<Vec<_>>();
        assert_eq!(summary, vec![(1, 0), (2, -42585), (3, -42581), (4, 0)]);

        assert_eq!(nodes[0]["hu"], json!("AB".repeat(20)));
        let ckc = base64::engine::general_purpose::STANDARD
            .decode(nodes[0]["ckc"].as_str().expect("ckc"))
            .expect("base64 ckc");
        assert_eq!(&ckc[..4], &[0, 0, 0, 1]);
    }

    #[test]
    fn built_request_is_served() {
        let offline = AssetInfo {
            content_key: [7; 16],
            content_iv: [8; 16],
            is_content_key_provided: true,
            content_type: ContentType::Audio,
            license_type: LicenseType::OfflineHls,
            stream_id: Some(vec![1; 16]),
            title_id: Some(vec![2; 4]),
            rental_duration: 3600,
            ..AssetInfo::default()
        };
        let operations = vec![
            Operation::new(10, SpcBuilder::new().build(), offline.clone()),
            Operation::new(11, vec![0, 0, 0, 5], AssetInfo::default()),
        ];

        let request = build_request(&operations);
        let parsed = parse_request(&request.to_string()).expect("request");
        let asset = &parsed[0].operation.as_ref().expect("operation").asset_info;
        assert_eq!(asset.content_key, offline.content_key);
        assert_eq!(asset.title_id, offline.title_id);
        assert_eq!(asset.rental_duration, 3600);
        assert_eq!(asset.hdcp_requirement, HdcpRequirement::Type0);

        let response = process_request(&server(), &request.to_string());
        let results = parse_response(&response).expect("response");
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].id, 10);
        assert_eq!(results[0].status, Status::NoErr);
        assert_eq!(results[0].hu, vec![0xab; 20]);
        assert!(!results[0].ckc.is_empty());
        assert_eq!(results[1].status, Status::SpcVersionErr);
        assert!(results[1].ckc.is_empty());
    }
}
