// CLI integration tests for convert/inspect flows.
use std::fs;
use std::path::Path;
use std::process::Command;

use serde_json::Value;

fn cmd() -> Command {
    let exe = env!("CARGO_BIN_EXE_ddbconv");
    Command::new(exe)
}

fn parse_json(value: &str) -> Value {
    serde_json::from_str(value).expect("valid json")
}

fn parse_json_line(output: &[u8]) -> Value {
    let text = String::from_utf8_lossy(output);
    let line = text.lines().next().expect("json line");
    parse_json(line)
}

// One table, two records, in the header-less layout the game client ships.
fn record_stream() -> Vec<u8> {
    fn text(out: &mut Vec<u8>, value: &str) {
        out.extend_from_slice(&(value.len() as u16).to_le_bytes());
        out.extend_from_slice(value.as_bytes());
    }
    fn block(out: &mut Vec<u8>, srv: u8, body: &[u8]) {
        out.extend_from_slice(&[0x02, srv]);
        out.extend_from_slice(&((body.len() + 4) as u16).to_le_bytes());
        out.extend_from_slice(body);
    }

    let mut out = 2u32.to_le_bytes().to_vec();
    let mut template = Vec::new();
    for (name, tag) in [("SrcFileName", 9u8), ("Size", 3), ("_Flags", 6)] {
        text(&mut template, name);
        template.extend_from_slice(&[tag, 0x28]);
    }
    text(&mut template, "_TargetTable");
    template.extend_from_slice(&[9, 0x28]);
    text(&mut template, "_Shared-WorldData");
    block(&mut out, 1, &template);

    for (name, size, flags) in [("Root.wad", 1024u32, 1u8), ("Sound & Music.wad", 0, 0)] {
        let mut record = Vec::new();
        text(&mut record, name);
        record.extend_from_slice(&size.to_le_bytes());
        record.push(flags);
        block(&mut out, 2, &record);
    }
    out
}

fn write(path: &Path, bytes: &[u8]) {
    fs::write(path, bytes).expect("write fixture");
}

#[test]
fn bin_to_xml_to_bin_is_byte_identical() {
    let temp = tempfile::tempdir().expect("tempdir");
    let bin = temp.path().join("LatestFileList.bin");
    write(&bin, &record_stream());

    let to_xml = cmd()
        .args(["convert", bin.to_str().unwrap()])
        .output()
        .expect("convert to xml");
    assert!(to_xml.status.success(), "{}", String::from_utf8_lossy(&to_xml.stderr));
    assert!(to_xml.stdout.is_empty());

    let xml_path = temp.path().join("LatestFileList.xml");
    let text = fs::read_to_string(&xml_path).expect("xml written");
    assert!(text.starts_with("<?xml version=\"1.0\" encoding=\"utf-8\"?>\n<LatestFileList FORMAT=\"kingsisle\">\n"));
    assert!(text.contains("<SrcFileName TYPE=\"STR\">Sound &amp; Music.wad</SrcFileName>"));
    assert!(text.contains("<_Flags TYPE=\"UBYT\" NOXFER=\"TRUE\">1</_Flags>"));

    fs::remove_file(&bin).expect("remove original");
    let to_bin = cmd()
        .args(["convert", xml_path.to_str().unwrap()])
        .output()
        .expect("convert to bin");
    assert!(to_bin.status.success(), "{}", String::from_utf8_lossy(&to_bin.stderr));
    assert_eq!(fs::read(&bin).expect("bin written"), record_stream());
}

#[test]
fn explicit_format_and_output_path() {
    let temp = tempfile::tempdir().expect("tempdir");
    let bin = temp.path().join("files.bin");
    write(&bin, &record_stream());
    let xml_path = temp.path().join("out.xml");
    let ddb = temp.path().join("files.ddb");

    let status = cmd()
        .args(["convert", bin.to_str().unwrap(), "-o", xml_path.to_str().unwrap(), "--root", "Manifest"])
        .status()
        .expect("convert");
    assert!(status.success());
    let text = fs::read_to_string(&xml_path).expect("xml");
    assert!(text.contains("<Manifest FORMAT=\"kingsisle\">"));

    let status = cmd()
        .args([
            "convert",
            xml_path.to_str().unwrap(),
            "--format",
            "ddb-pooled",
            "-o",
            ddb.to_str().unwrap(),
        ])
        .status()
        .expect("convert");
    assert!(status.success());
    let bytes = fs::read(&ddb).expect("container");
    assert_eq!(&bytes[..6], b"DDB1\x02\x00");

    let inspect = cmd()
        .args(["inspect", ddb.to_str().unwrap()])
        .output()
        .expect("inspect");
    assert!(inspect.status.success());
    let summary = parse_json_line(&inspect.stdout);
    assert_eq!(summary["format"], "ddb-pooled");
    let table = &summary["tables"][0];
    assert_eq!(table["name"], "_Shared-WorldData");
    assert_eq!(table["rows"], 2);
    assert_eq!(table["columns"][0]["name"], "SrcFileName");
    assert_eq!(table["columns"][0]["type"], "STR");
    assert_eq!(table["columns"][2]["flags"][0], "NOXFER");
}

#[test]
fn several_inputs_convert_in_parallel() {
    let temp = tempfile::tempdir().expect("tempdir");
    let names = ["a.bin", "b.bin", "c.bin"];
    for name in names {
        write(&temp.path().join(name), &record_stream());
    }
    let mut command = cmd();
    command.arg("convert");
    for name in names {
        command.arg(temp.path().join(name));
    }
    let output = command.output().expect("convert");
    assert!(output.status.success());
    for name in names {
        let xml_path = temp.path().join(name).with_extension("xml");
        let text = fs::read_to_string(&xml_path).expect("xml written");
        let stem = name.trim_end_matches(".bin");
        assert!(text.contains(&format!("<{stem} FORMAT=\"kingsisle\">")));
    }
}

#[test]
fn output_flag_rejects_several_inputs() {
    let temp = tempfile::tempdir().expect("tempdir");
    let out = cmd()
        .args(["convert", "a.bin", "b.bin", "-o", "out.xml"])
        .current_dir(temp.path())
        .output()
        .expect("convert");
    assert_eq!(out.status.code(), Some(2));
    let err = parse_json_line(&out.stderr);
    assert_eq!(err["error"]["kind"], "Usage");
}

#[test]
fn truncated_input_reports_json_error() {
    let temp = tempfile::tempdir().expect("tempdir");
    let bin = temp.path().join("broken.bin");
    let bytes = record_stream();
    write(&bin, &bytes[..bytes.len() - 3]);

    let out = cmd()
        .args(["convert", bin.to_str().unwrap()])
        .output()
        .expect("convert");
    assert_eq!(out.status.code(), Some(6));
    let err = parse_json_line(&out.stderr);
    assert_eq!(err["error"]["kind"], "TruncatedInput");
    assert!(err["error"]["path"].as_str().unwrap().ends_with("broken.bin"));
    assert!(err["error"]["hint"].is_string());
    assert!(!temp.path().join("broken.xml").exists());
}

#[test]
fn bad_container_version_exit_code() {
    let temp = tempfile::tempdir().expect("tempdir");
    let ddb = temp.path().join("future.ddb");
    write(&ddb, b"DDB1\x09\x00\x00\x00\x00\x00");

    let out = cmd()
        .args(["inspect", ddb.to_str().unwrap()])
        .output()
        .expect("inspect");
    assert_eq!(out.status.code(), Some(5));
    let err = parse_json_line(&out.stderr);
    assert_eq!(err["error"]["kind"], "UnsupportedVersion");
    assert_eq!(err["error"]["offset"], 4);
}

#[test]
fn malformed_xml_exit_code() {
    let temp = tempfile::tempdir().expect("tempdir");
    let xml_path = temp.path().join("bad.xml");
    write(&xml_path, b"<root><T><RECORD><id>1</id></RECORD></T></root>");

    let out = cmd()
        .args(["convert", xml_path.to_str().unwrap()])
        .output()
        .expect("convert");
    assert_eq!(out.status.code(), Some(13));
    let err = parse_json_line(&out.stderr);
    assert_eq!(err["error"]["kind"], "Xml");
    assert_eq!(err["error"]["table"], "T");
    assert_eq!(err["error"]["column"], "id");
}

#[test]
fn missing_input_is_io_error() {
    let temp = tempfile::tempdir().expect("tempdir");
    let out = cmd()
        .args(["inspect", "missing.bin"])
        .current_dir(temp.path())
        .output()
        .expect("inspect");
    assert_eq!(out.status.code(), Some(3));
    let err = parse_json_line(&out.stderr);
    assert_eq!(err["error"]["kind"], "Io");
    assert!(err["error"]["causes"].is_array());
}

#[test]
fn usage_exit_code() {
    let out = cmd().args(["convert", "--format", "csv", "a.bin"]).output().expect("run");
    assert_eq!(out.status.code(), Some(2));
    let err = parse_json_line(&out.stderr);
    assert_eq!(err["error"]["kind"], "Usage");
}
