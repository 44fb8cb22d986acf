//! Purpose: Hold top-level CLI command dispatch for `ddbconv`.
//! Exports: `dispatch_command`.
//! Role: Keep `main.rs` focused on parse/bootstrap and delegate file conversion here.
//! Invariants: Each input file is converted independently; one failure never aborts siblings.
//! Invariants: Output is written only after the whole input has decoded and re-encoded.

use std::fs;
use std::path::Path;

use ddbconv::core::format;
use ddbconv::{TableSet, xml};
use tracing::{error, info};

use super::*;
use crate::inspect_json::InspectSummary;

pub(super) fn dispatch_command(command: Command) -> Result<RunOutcome, Error> {
    match command {
        Command::Convert {
            inputs,
            output,
            format,
            root,
        } => {
            if output.is_some() && inputs.len() > 1 {
                return Err(Error::new(ErrorKind::Usage)
                    .with_message("--output cannot be combined with several inputs")
                    .with_hint("Drop -o to write each output next to its input."));
            }
            let options = ConvertOptions {
                format: format.map(BinaryFormat::from),
                root,
            };

            if let [input] = inputs.as_slice() {
                convert_file(input, output.as_deref(), &options)?;
                return Ok(RunOutcome::ok());
            }

            let options = &options;
            let results = std::thread::scope(|scope| {
                let handles = inputs
                    .iter()
                    .map(|input| scope.spawn(move || convert_file(input, None, options)))
                    .collect::<Vec<_>>();
                handles
                    .into_iter()
                    .map(|handle| {
                        handle.join().unwrap_or_else(|_| {
                            Err(Error::new(ErrorKind::Internal)
                                .with_message("conversion thread panicked"))
                        })
                    })
                    .collect::<Vec<_>>()
            });

            let mut first_failure = None;
            for result in results {
                if let Err(err) = result {
                    if first_failure.is_none() {
                        first_failure = Some(err);
                    } else {
                        error!(error = %err, "conversion failed");
                    }
                }
            }
            match first_failure {
                Some(err) => Err(err),
                None => Ok(RunOutcome::ok()),
            }
        }
        Command::Inspect { input } => {
            let (format, tables) = read_tables(&input)?;
            let summary = InspectSummary::new(&input, format, &tables);
            let value = serde_json::to_value(&summary).map_err(|err| {
                Error::new(ErrorKind::Internal)
                    .with_message("failed to encode summary")
                    .with_source(err)
            })?;
            emit_json(value);
            Ok(RunOutcome::ok())
        }
    }
}

struct ConvertOptions {
    format: Option<BinaryFormat>,
    root: Option<String>,
}

fn convert_file(input: &Path, output: Option<&Path>, options: &ConvertOptions) -> Result<PathBuf, Error> {
    if is_xml(input) {
        let doc = xml::load(&read_text(input)?).map_err(|err| err.with_path(input))?;
        let format = options.format.unwrap_or(doc.format);
        let bytes = format::encode(format, &doc.tables).map_err(|err| err.with_path(input))?;
        let target = output.map_or_else(|| input.with_extension("bin"), Path::to_path_buf);
        write_output(&target, &bytes)?;
        info!(
            input = %input.display(),
            output = %target.display(),
            %format,
            tables = doc.tables.len(),
            "encoded XML to binary"
        );
        Ok(target)
    } else {
        let bytes = read_bytes(input)?;
        let (format, tables) = format::decode(&bytes).map_err(|err| err.with_path(input))?;
        let root = match &options.root {
            Some(root) => root.clone(),
            None => default_root(input),
        };
        let text = xml::save(&tables, format, &root).map_err(|err| err.with_path(input))?;
        let target = output.map_or_else(|| input.with_extension("xml"), Path::to_path_buf);
        write_output(&target, text.as_bytes())?;
        info!(
            input = %input.display(),
            output = %target.display(),
            %format,
            tables = tables.len(),
            "decoded binary to XML"
        );
        Ok(target)
    }
}

fn read_tables(input: &Path) -> Result<(BinaryFormat, TableSet), Error> {
    if is_xml(input) {
        let doc = xml::load(&read_text(input)?).map_err(|err| err.with_path(input))?;
        Ok((doc.format, doc.tables))
    } else {
        format::decode(&read_bytes(input)?).map_err(|err| err.with_path(input))
    }
}

fn is_xml(path: &Path) -> bool {
    path.extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("xml"))
}

fn default_root(input: &Path) -> String {
    input
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| "root".to_string())
}

fn read_bytes(path: &Path) -> Result<Vec<u8>, Error> {
    fs::read(path).map_err(|err| {
        Error::new(ErrorKind::Io)
            .with_message("failed to read input")
            .with_path(path)
            .with_source(err)
    })
}

fn read_text(path: &Path) -> Result<String, Error> {
    String::from_utf8(read_bytes(path)?).map_err(|err| {
        Error::new(ErrorKind::InvalidUtf8)
            .with_message("XML input is not valid UTF-8")
            .with_path(path)
            .with_source(err)
    })
}

fn write_output(path: &Path, bytes: &[u8]) -> Result<(), Error> {
    fs::write(path, bytes).map_err(|err| {
        Error::new(ErrorKind::Io)
            .with_message("failed to write output")
            .with_path(path)
            .with_source(err)
    })
}

#[cfg(test)]
mod tests {
    use super::{default_root, is_xml};
    use std::path::Path;

    #[test]
    fn direction_follows_extension() {
        assert!(is_xml(Path::new("LatestFileList.xml")));
        assert!(is_xml(Path::new("dir/UPPER.XML")));
        assert!(!is_xml(Path::new("LatestFileList.bin")));
        assert!(!is_xml(Path::new("xml")));
    }

    #[test]
    fn root_defaults_to_file_stem() {
        assert_eq!(default_root(Path::new("data/LatestFileList.bin")), "LatestFileList");
        assert_eq!(default_root(Path::new("noext")), "noext");
    }
}
