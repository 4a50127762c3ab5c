//! Streets fixed-route real-time SOAP service (`GetVehicles`).
//!
//! The response is a WCF data-contract document: vehicle elements carry a
//! nillable `CurrentWork` whose `Trip/Key` is the schedule trip id, and a
//! nillable `NextStops` list. Element prefixes vary between deployments, so
//! matching is done on local names only.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use quick_xml::events::{BytesStart, Event};
use reqwest::StatusCode;
use tracing::{debug, warn};

use super::{SourceAdapter, SourceBatch, SourceExtras, SourceKind, SourceRecord};
use crate::error::{SourceError, SourceUnavailable};
use crate::fetch::{HttpClient, post_soap};

const SOAP_ENV_NS: &str = "http://schemas.xmlsoap.org/soap/envelope/";

/// Where and how to call the service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreetsConfig {
    pub endpoint: String,
    pub soap_action: String,
    pub namespace: String,
    /// Name and value of the single `GetVehicles` argument.
    pub argument: (String, String),
    /// Local name of the vehicle elements in the response.
    pub vehicle_element: String,
}

impl StreetsConfig {
    pub const DEFAULT_NAMESPACE: &'static str = "http://tempuri.org/";
    pub const DEFAULT_SOAP_ACTION: &'static str =
        "http://tempuri.org/IFixedRouteRealTimeWebService/GetVehicles";

    pub fn for_host(host: &str) -> Self {
        Self {
            endpoint: format!("http://{host}/streets/WCF/FixedRouteRealTimeWebService.svc"),
            soap_action: Self::DEFAULT_SOAP_ACTION.to_string(),
            namespace: Self::DEFAULT_NAMESPACE.to_string(),
            argument: ("agencyId".to_string(), "1".to_string()),
            vehicle_element: "Vehicle".to_string(),
        }
    }

    pub fn envelope(&self) -> String {
        let (name, value) = &self.argument;
        format!(
            "<?xml version=\"1.0\" encoding=\"utf-8\"?>\
             <s:Envelope xmlns:s=\"{SOAP_ENV_NS}\">\
             <s:Body><GetVehicles xmlns=\"{ns}\"><{name}>{value}</{name}></GetVehicles></s:Body>\
             </s:Envelope>",
            ns = self.namespace,
        )
    }
}

pub struct StreetsAdapter {
    client: Arc<dyn HttpClient>,
    config: StreetsConfig,
    /// The raw response is written here for drill-down when set.
    dump_path: Option<PathBuf>,
}

impl StreetsAdapter {
    pub fn new(client: Arc<dyn HttpClient>, config: StreetsConfig, dump_path: Option<PathBuf>) -> Self {
        Self {
            client,
            config,
            dump_path,
        }
    }
}

#[async_trait]
impl SourceAdapter for StreetsAdapter {
    fn kind(&self) -> SourceKind {
        SourceKind::Streets
    }

    #[tracing::instrument(skip(self), fields(endpoint = %self.config.endpoint))]
    async fn fetch(&self) -> Result<SourceBatch, SourceUnavailable> {
        let (status, body) = post_soap(
            self.client.as_ref(),
            &self.config.endpoint,
            &self.config.soap_action,
            self.config.envelope(),
        )
        .await?;
        check_status(status, &body)?;

        if let Some(path) = &self.dump_path {
            if let Err(e) = tokio::fs::write(path, &body).await {
                warn!(path = %path.display(), error = %e, "Failed to save streets response");
            }
        }

        let batch = parse_vehicles(&body, &self.config.vehicle_element)?;
        debug!(records = batch.records.len(), "Streets vehicles parsed");
        Ok(batch)
    }
}

#[derive(Debug, Default)]
struct Frame {
    local: String,
    nil: bool,
    text: String,
    /// First Key/Id/Name child, used as the vehicle reference.
    ident: Option<String>,
    trip_key: Option<String>,
    work: Option<Work>,
    next_stops: Option<bool>,
}

#[derive(Debug)]
enum Work {
    Idle,
    Assigned(Option<String>),
}

fn local_name(e: &BytesStart<'_>) -> String {
    String::from_utf8_lossy(e.local_name().as_ref()).into_owned()
}

fn is_nil(e: &BytesStart<'_>) -> Result<bool, SourceUnavailable> {
    for attr in e.attributes() {
        let attr = attr.map_err(|err| SourceUnavailable::Xml(err.to_string()))?;
        if attr.key.local_name().as_ref() == b"nil" {
            return Ok(attr.value.as_ref() == b"true");
        }
    }
    Ok(false)
}

/// Returns `true` when the document is a SOAP fault.
pub fn is_soap_fault(body: &[u8]) -> bool {
    let mut reader = quick_xml::Reader::from_reader(body);
    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e) | Event::Empty(ref e)) if e.local_name().as_ref() == b"Fault" => {
                return true;
            }
            Ok(Event::Eof) | Err(_) => return false,
            _ => {}
        }
        buf.clear();
    }
}

/// Accepts a success status, and a `500` whose body is a SOAP fault so the
/// fault string can be surfaced by [`parse_vehicles`].
fn check_status(status: StatusCode, body: &[u8]) -> Result<(), SourceUnavailable> {
    if status.is_success() || (status == StatusCode::INTERNAL_SERVER_ERROR && is_soap_fault(body)) {
        Ok(())
    } else {
        Err(SourceUnavailable::Status(status))
    }
}

/// Normalizes a `GetVehicles` response.
///
/// Vehicles with a nil or missing `CurrentWork` are not doing a trip and are
/// left out of the records; they still count towards `total_vehicles`.
///
/// # Errors
///
/// [`SourceUnavailable::SoapFault`] for a fault response and
/// [`SourceUnavailable::Xml`] for a document that does not parse.
pub fn parse_vehicles(body: &[u8], vehicle_element: &str) -> Result<SourceBatch, SourceUnavailable> {
    let mut reader = quick_xml::Reader::from_reader(body);
    reader.config_mut().trim_text(true);

    let mut stack: Vec<Frame> = Vec::new();
    let mut buf = Vec::new();
    let mut fault: Option<String> = None;

    let mut records = Vec::new();
    let mut skipped = Vec::new();
    let mut total_vehicles = 0usize;
    let mut with_current_work = 0usize;

    loop {
        let event = reader.read_event_into(&mut buf)?;
        let closed = match event {
            Event::Start(ref e) => {
                stack.push(Frame {
                    local: local_name(e),
                    nil: is_nil(e)?,
                    ..Default::default()
                });
                None
            }
            Event::Empty(ref e) => Some(Frame {
                local: local_name(e),
                nil: is_nil(e)?,
                ..Default::default()
            }),
            Event::Text(ref t) => {
                if let Some(top) = stack.last_mut() {
                    let text = t.unescape().map_err(|err| SourceUnavailable::Xml(err.to_string()))?;
                    top.text.push_str(&text);
                }
                None
            }
            Event::End(_) => stack.pop(),
            Event::Eof => break,
            _ => None,
        };
        buf.clear();

        let Some(frame) = closed else {
            continue;
        };

        if frame.local == "faultstring" || (frame.local == "Fault" && fault.is_none()) {
            fault = Some(frame.text.trim().to_string());
        }

        let is_vehicle = frame.work.is_some() || frame.local == vehicle_element;
        if is_vehicle {
            total_vehicles += 1;
            let reference = frame
                .ident
                .clone()
                .unwrap_or_else(|| format!("#{total_vehicles}"));
            match &frame.work {
                Some(Work::Assigned(Some(trip_key))) if !trip_key.is_empty() => {
                    with_current_work += 1;
                    records.push(SourceRecord::new(
                        trip_key.clone(),
                        frame.next_stops == Some(true),
                        reference,
                    ));
                }
                Some(Work::Assigned(_)) => {
                    with_current_work += 1;
                    skipped.push(SourceError::new(reference, "CurrentWork without Trip/Key"));
                }
                Some(Work::Idle) | None => {}
            }
        }

        let Some(parent) = stack.last_mut() else {
            continue;
        };
        match frame.local.as_str() {
            "Key" if parent.local == "Trip" => {
                parent.trip_key = Some(frame.text.trim().to_string());
            }
            "Trip" if parent.local == "CurrentWork" => {
                parent.trip_key = frame.trip_key;
            }
            "CurrentWork" => {
                parent.work = Some(if frame.nil {
                    Work::Idle
                } else {
                    Work::Assigned(frame.trip_key)
                });
            }
            "NextStops" => parent.next_stops = Some(!frame.nil),
            "Key" | "Id" | "Name" if parent.ident.is_none() && !frame.text.trim().is_empty() => {
                parent.ident = Some(frame.text.trim().to_string());
            }
            _ => {}
        }
    }

    if let Some(reason) = fault {
        return Err(SourceUnavailable::SoapFault(reason));
    }

    Ok(SourceBatch {
        records,
        skipped,
        extras: SourceExtras {
            total_vehicles: Some(total_vehicles),
            with_current_work: Some(with_current_work),
            ..Default::default()
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const RESPONSE: &str = r#"<s:Envelope xmlns:s="http://schemas.xmlsoap.org/soap/envelope/">
      <s:Body>
        <GetVehiclesResponse xmlns="http://tempuri.org/">
          <GetVehiclesResult xmlns:a="http://schemas.datacontract.org/2004/07/Streets" xmlns:i="http://www.w3.org/2001/XMLSchema-instance">
            <a:Vehicle>
              <a:CurrentWork>
                <a:Trip><a:Key>T100</a:Key><a:Name>Route 10 outbound</a:Name></a:Trip>
              </a:CurrentWork>
              <a:Key>bus-1</a:Key>
              <a:NextStops><a:Stop><a:Key>S1</a:Key></a:Stop></a:NextStops>
            </a:Vehicle>
            <a:Vehicle>
              <a:CurrentWork>
                <a:Trip><a:Key>T200</a:Key></a:Trip>
              </a:CurrentWork>
              <a:Key>bus-2</a:Key>
              <a:NextStops i:nil="true"/>
            </a:Vehicle>
            <a:Vehicle>
              <a:CurrentWork i:nil="true"/>
              <a:Key>bus-3</a:Key>
              <a:NextStops i:nil="true"/>
            </a:Vehicle>
            <a:Vehicle>
              <a:CurrentWork><a:Trip i:nil="true"/></a:CurrentWork>
              <a:Key>bus-4</a:Key>
            </a:Vehicle>
            <a:Vehicle>
              <a:Key>bus-5</a:Key>
            </a:Vehicle>
          </GetVehiclesResult>
        </GetVehiclesResponse>
      </s:Body>
    </s:Envelope>"#;

    #[test]
    fn test_parse_vehicles() {
        let batch = parse_vehicles(RESPONSE.as_bytes(), "Vehicle").unwrap();

        assert_eq!(
            batch.records,
            vec![
                SourceRecord::new("T100", true, "bus-1"),
                SourceRecord::new("T200", false, "bus-2"),
            ]
        );
        assert_eq!(
            batch.skipped,
            vec![SourceError::new("bus-4", "CurrentWork without Trip/Key")]
        );
        assert_eq!(batch.extras.total_vehicles, Some(5));
        assert_eq!(batch.extras.with_current_work, Some(3));
    }

    #[test]
    fn test_vehicles_found_by_current_work_child() {
        // element name differs from the configured one
        let body = r#"<Envelope><Body><VehicleData>
            <CurrentWork><Trip><Key>T1</Key></Trip></CurrentWork>
            <Id>7</Id>
        </VehicleData></Body></Envelope>"#;

        let batch = parse_vehicles(body.as_bytes(), "Vehicle").unwrap();

        assert_eq!(batch.records, vec![SourceRecord::new("T1", false, "7")]);
    }

    const FAULT: &str = r#"<s:Envelope xmlns:s="http://schemas.xmlsoap.org/soap/envelope/">
      <s:Body><s:Fault><faultcode>s:Client</faultcode><faultstring>Unknown agency</faultstring></s:Fault></s:Body>
    </s:Envelope>"#;

    #[test]
    fn test_soap_fault() {
        assert!(is_soap_fault(FAULT.as_bytes()));
        let err = parse_vehicles(FAULT.as_bytes(), "Vehicle").unwrap_err();
        assert!(matches!(err, SourceUnavailable::SoapFault(ref s) if s == "Unknown agency"));
    }

    #[test]
    fn test_not_a_fault() {
        assert!(!is_soap_fault(RESPONSE.as_bytes()));
    }

    #[test]
    fn test_check_status() {
        assert!(check_status(StatusCode::OK, RESPONSE.as_bytes()).is_ok());
        assert!(check_status(StatusCode::INTERNAL_SERVER_ERROR, FAULT.as_bytes()).is_ok());

        let err = check_status(StatusCode::INTERNAL_SERVER_ERROR, b"<html>oops</html>").unwrap_err();
        assert!(matches!(err, SourceUnavailable::Status(StatusCode::INTERNAL_SERVER_ERROR)));
        let err = check_status(StatusCode::BAD_GATEWAY, FAULT.as_bytes()).unwrap_err();
        assert!(matches!(err, SourceUnavailable::Status(StatusCode::BAD_GATEWAY)));
    }

    /// Serves one canned HTTP response on a local port and returns its URL.
    async fn serve_once(status_line: &'static str, body: &'static str) -> String {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = Vec::new();
            let mut buf = [0u8; 4096];
            // read headers, then the declared body
            loop {
                let n = socket.read(&mut buf).await.unwrap();
                if n == 0 {
                    break;
                }
                request.extend_from_slice(&buf[..n]);
                let text = String::from_utf8_lossy(&request);
                if let Some(end) = text.find("\r\n\r\n") {
                    let length = text[..end]
                        .lines()
                        .find_map(|l| {
                            let (name, value) = l.split_once(':')?;
                            name.eq_ignore_ascii_case("content-length")
                                .then(|| value.trim().parse::<usize>().ok())?
                        })
                        .unwrap_or(0);
                    if request.len() >= end + 4 + length {
                        break;
                    }
                }
            }
            let response = format!(
                "HTTP/1.1 {status_line}\r\ncontent-type: text/xml; charset=utf-8\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
                body.len()
            );
            socket.write_all(response.as_bytes()).await.unwrap();
            socket.shutdown().await.unwrap();
        });
        format!("http://{addr}/streets/WCF/FixedRouteRealTimeWebService.svc")
    }

    struct LocalClient(reqwest::Client);

    #[async_trait]
    impl HttpClient for LocalClient {
        async fn execute(&self, req: reqwest::Request) -> reqwest::Result<reqwest::Response> {
            self.0.execute(req).await
        }
    }

    fn adapter(endpoint: String) -> StreetsAdapter {
        let client = LocalClient(reqwest::Client::builder().no_proxy().build().unwrap());
        let config = StreetsConfig {
            endpoint,
            ..StreetsConfig::for_host("unused")
        };
        StreetsAdapter::new(Arc::new(client), config, None)
    }

    #[tokio::test]
    async fn test_fetch_surfaces_fault_from_500() {
        let url = serve_once("500 Internal Server Error", FAULT).await;

        let err = adapter(url).fetch().await.unwrap_err();

        assert!(matches!(err, SourceUnavailable::SoapFault(ref s) if s == "Unknown agency"));
    }

    #[tokio::test]
    async fn test_fetch_500_without_fault_is_status() {
        let url = serve_once("500 Internal Server Error", "<html>Server Error</html>").await;

        let err = adapter(url).fetch().await.unwrap_err();

        assert!(matches!(err, SourceUnavailable::Status(StatusCode::INTERNAL_SERVER_ERROR)));
    }

    #[tokio::test]
    async fn test_fetch_parses_success() {
        let url = serve_once("200 OK", RESPONSE).await;

        let batch = adapter(url).fetch().await.unwrap();

        assert_eq!(batch.records.len(), 2);
    }

    #[test]
    fn test_malformed_xml() {
        let err = parse_vehicles(b"<a><b></a>", "Vehicle").unwrap_err();
        assert!(matches!(err, SourceUnavailable::Xml(_)));
    }

    #[test]
    fn test_envelope() {
        let config = StreetsConfig::for_host("streets.example.org");

        assert_eq!(
            config.endpoint,
            "http://streets.example.org/streets/WCF/FixedRouteRealTimeWebService.svc"
        );
        let envelope = config.envelope();
        assert!(envelope.contains("<GetVehicles xmlns=\"http://tempuri.org/\"><agencyId>1</agencyId></GetVehicles>"));
    }
}
