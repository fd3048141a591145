//! End-to-end conversion tests.
//!
//! Each test builds a small input on disk, runs the full pipeline and
//! inspects the promoted artifact (or its absence).

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use secflow_core::models::{NameSource, SampleType, SecflowOutput};
use secflow_core::{convert, ConvertError, ConverterConfig, Input, Outcome};

// ============================================================================
// Fixtures
// ============================================================================

struct Workspace {
    dir: tempfile::TempDir,
}

impl Workspace {
    fn new() -> Self {
        Self {
            dir: tempfile::tempdir().unwrap(),
        }
    }

    fn path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    fn config(&self) -> ConverterConfig {
        ConverterConfig {
            pdns_repository: self.path("state/passive_dns.json"),
            work_dir: Some(self.dir.path().to_path_buf()),
            output_dir: Some(self.path("out")),
            ..ConverterConfig::default()
        }
    }

    fn leftovers(&self) -> Vec<String> {
        fs::read_dir(self.dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .map(|e| e.file_name().to_string_lossy().to_string())
            .filter(|n| n.contains(".tmp") || n.ends_with(".secflow.json"))
            .collect()
    }
}

fn read_artifact(path: &Path) -> SecflowOutput {
    serde_json::from_slice(&fs::read(path).unwrap()).unwrap()
}

fn converted(outcome: Outcome) -> secflow_core::output::Artifact {
    match outcome {
        Outcome::Converted(artifact) => artifact,
        Outcome::NoTraffic => panic!("expected an artifact"),
    }
}

const CONN_HEADER: &str = "#separator \\x09\n\
    #set_separator\t,\n\
    #empty_field\t(empty)\n\
    #unset_field\t-\n\
    #path\tconn\n\
    #fields\tts\tuid\tid.orig_h\tid.orig_p\tid.resp_h\tid.resp_p\tproto\tservice\tduration\torig_bytes\tresp_bytes\tconn_state\torig_pkts\tresp_pkts\n\
    #types\ttime\tstring\taddr\tport\taddr\tport\tenum\tstring\tinterval\tcount\tcount\tstring\tcount\tcount\n";

fn write_pcap(path: &Path, frames: &[(u32, Vec<u8>)]) {
    let mut out = Vec::new();
    out.extend_from_slice(&0xa1b2c3d4u32.to_le_bytes());
    out.extend_from_slice(&2u16.to_le_bytes());
    out.extend_from_slice(&4u16.to_le_bytes());
    out.extend_from_slice(&[0u8; 8]);
    out.extend_from_slice(&65535u32.to_le_bytes());
    out.extend_from_slice(&1u32.to_le_bytes());
    for (sec, data) in frames {
        out.extend_from_slice(&sec.to_le_bytes());
        out.extend_from_slice(&0u32.to_le_bytes());
        out.extend_from_slice(&(data.len() as u32).to_le_bytes());
        out.extend_from_slice(&(data.len() as u32).to_le_bytes());
        out.extend_from_slice(data);
    }
    fs::File::create(path).unwrap().write_all(&out).unwrap();
}

fn tcp(src: [u8; 4], sport: u16, dst: [u8; 4], dport: u16, payload: &[u8]) -> Vec<u8> {
    let builder = etherparse::PacketBuilder::ethernet2([2, 0, 0, 0, 0, 1], [2, 0, 0, 0, 0, 2])
        .ipv4(src, dst, 64)
        .tcp(sport, dport, 1, 64240)
        .ack(1);
    let mut out = Vec::with_capacity(builder.size(payload.len()));
    builder.write(&mut out, payload).unwrap();
    out
}

// ============================================================================
// Scenarios
// ============================================================================

#[test]
fn test_conn_log_drops_local_pair() {
    let ws = Workspace::new();
    let conn = ws.path("conn.log");
    fs::write(
        &conn,
        format!(
            "{CONN_HEADER}\
             1700000000.000000\tC1\t10.0.0.1\t50000\t10.0.0.2\t445\ttcp\t-\t1.0\t500\t500\tSF\t4\t4\n\
             1700000001.000000\tC2\t10.0.0.1\t50001\t93.184.216.34\t443\ttcp\tssl\t2.0\t1000\t0\tSF\t3\t0\n"
        ),
    )
    .unwrap();

    let artifact = converted(convert(&Input::ConnLog { conn, dns: None }, &ws.config()).unwrap());
    assert_eq!(artifact.path, ws.path("out/conn.secflow.json"));

    let output = read_artifact(&artifact.path);
    assert_eq!(output.metadata.sample_type, SampleType::Zeek);
    assert_eq!(output.metadata.secflow_count, 1);
    let flow = &output.secflows[0];
    assert_eq!(flow.key.dst.to_string(), "93.184.216.34");
    assert_eq!(flow.source_bytes, 1000);
    assert_eq!(flow.duration, 2.0);
    assert!(ws.leftovers().is_empty());
}

#[test]
fn test_capture_duration_spans_all_frames() {
    let ws = Workspace::new();
    let pcap = ws.path("capture.pcap");
    let (client, server) = ([10, 0, 0, 1], [93, 184, 216, 34]);
    write_pcap(
        &pcap,
        &[
            (1_700_000_000, tcp(client, 40000, server, 80, b"a")),
            (1_700_000_001, tcp(server, 80, client, 40000, b"bb")),
            (1_700_000_004, tcp(client, 40000, server, 80, b"c")),
        ],
    );

    let artifact = converted(convert(&Input::Capture(pcap), &ws.config()).unwrap());
    let output = read_artifact(&artifact.path);
    assert_eq!(output.secflows.len(), 1);
    assert_eq!(output.secflows[0].duration, 4.0);
    assert_eq!(output.secflows[0].total_packets(), 3);
}

#[test]
fn test_interflow_records_sum_dest_bytes() {
    let ws = Workspace::new();
    let log = ws.path("interflow.json");
    fs::write(
        &log,
        r#"[
            {"srcip":"10.0.0.5","dstip":"8.8.8.8","srcport":5000,"dstport":53,"proto_name":"udp","timestamp":1700000000000,"inbytes_delta":50},
            {"srcip":"10.0.0.5","dstip":"8.8.8.8","srcport":5000,"dstport":53,"proto_name":"udp","timestamp":1700000000500,"inbytes_delta":70}
        ]"#,
    )
    .unwrap();

    let artifact = converted(convert(&Input::Interflow(log), &ws.config()).unwrap());
    let output = read_artifact(&artifact.path);
    assert_eq!(output.secflows.len(), 1);
    assert_eq!(output.secflows[0].dest_bytes, 120);
}

#[test]
fn test_all_local_capture_yields_no_artifact() {
    let ws = Workspace::new();
    let pcap = ws.path("lan.pcap");
    write_pcap(
        &pcap,
        &[
            (1_700_000_000, tcp([10, 0, 0, 1], 40000, [10, 0, 0, 2], 22, b"x")),
            (1_700_000_001, tcp([10, 0, 0, 2], 22, [10, 0, 0, 1], 40000, b"y")),
        ],
    );

    let outcome = convert(&Input::Capture(pcap), &ws.config()).unwrap();
    assert!(matches!(outcome, Outcome::NoTraffic));
    assert!(ws.leftovers().is_empty());
    assert!(!ws.path("out").exists());
}

// ============================================================================
// Cross-cutting properties
// ============================================================================

#[test]
fn test_wrong_format_is_rejected_before_output() {
    let ws = Workspace::new();
    let conn = ws.path("conn.log");
    fs::write(&conn, CONN_HEADER).unwrap();
    let pcap = ws.path("capture.pcap");
    write_pcap(&pcap, &[(1_700_000_000, tcp([10, 0, 0, 1], 1, [8, 8, 8, 8], 2, b""))]);

    let attempts = [
        Input::Capture(conn.clone()),
        Input::Interflow(conn.clone()),
        Input::ConnLog { conn: pcap.clone(), dns: None },
        Input::Interflow(pcap),
    ];
    for input in &attempts {
        let err = convert(input, &ws.config()).unwrap_err();
        assert!(err.is_format_error(), "{input:?} gave {err}");
    }
    assert!(ws.leftovers().is_empty());
    assert!(!ws.path("out").exists());
}

#[test]
fn test_passive_dns_names_and_persists() {
    let ws = Workspace::new();
    let conn = ws.path("conn.log");
    fs::write(
        &conn,
        format!("{CONN_HEADER}1700000000.0\tC1\t10.0.0.1\t50000\t1.2.3.4\t443\ttcp\tssl\t1.0\t10\t10\tSF\t1\t1\n"),
    )
    .unwrap();
    let dns_log = ws.path("dns.log");
    fs::write(
        &dns_log,
        "#separator \\x09\n#set_separator\t,\n#fields\tts\tquery\tanswers\n1700000000.0\tExample.com.\t1.2.3.4\n",
    )
    .unwrap();

    let config = ws.config();
    let artifact = converted(convert(&Input::ConnLog { conn: conn.clone(), dns: Some(dns_log) }, &config).unwrap());
    let flow = &read_artifact(&artifact.path).secflows[0];
    assert_eq!(flow.name, "example.com");
    assert_eq!(flow.name_source, NameSource::PassiveDns);

    // a later run without the sidecar still names the flow from the repository
    let artifact = converted(convert(&Input::ConnLog { conn, dns: None }, &config).unwrap());
    assert_eq!(read_artifact(&artifact.path).secflows[0].name, "example.com");
}

#[test]
fn test_without_names_destination_stays_raw() {
    let ws = Workspace::new();
    let mut config = ws.config();
    config.update_passive_dns = false;
    let conn = ws.path("conn.log");
    fs::write(
        &conn,
        format!("{CONN_HEADER}1700000000.0\tC1\t10.0.0.1\t50000\t1.2.3.4\t443\ttcp\tssl\t1.0\t10\t10\tSF\t1\t1\n"),
    )
    .unwrap();

    let artifact = converted(convert(&Input::ConnLog { conn, dns: None }, &config).unwrap());
    assert_eq!(read_artifact(&artifact.path).secflows[0].name, "1.2.3.4");
    assert!(!config.pdns_repository.exists());
}

#[test]
fn test_hash_binds_sample_id_to_content() {
    let ws = Workspace::new();
    let log = ws.path("flows.jsonl");
    fs::write(
        &log,
        "{\"srcip\":\"10.0.0.5\",\"dstip\":\"1.1.1.1\",\"proto\":17,\"srcport\":1,\"dstport\":53,\"timestamp\":1700000000000}\n",
    )
    .unwrap();

    let first = converted(convert(&Input::Interflow(log.clone()), &ws.config()).unwrap());
    let second = converted(convert(&Input::Interflow(log), &ws.config()).unwrap());
    assert_ne!(first.sample_id, second.sample_id);
    assert_ne!(first.hash, second.hash);
    assert_eq!(first.hash.len(), 64);
}

#[test]
fn test_missing_input_is_io_error() {
    let ws = Workspace::new();
    let err = convert(&Input::Capture(ws.path("absent.pcap")), &ws.config()).unwrap_err();
    assert!(matches!(err, ConvertError::Io { .. }));
}
