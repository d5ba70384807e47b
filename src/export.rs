use chrono::Local;
use lef21::{LefLibrary, LefMacro};
use std::fs;
use std::path::{Path, PathBuf};
use terminal_size::{terminal_size, Width};

use crate::lef;
use crate::{LefgenResult, Reports, VER};

const FOOTER: &str = "END LIBRARY";

/// Writes `mac` as a one-macro library to `<dir>/<name>.<ext>`, replacing any
/// earlier copy.
pub fn write_separate(dir: &Path, ext: &str, mac: &LefMacro) -> LefgenResult<PathBuf> {
    let path = dir.join(format!("{}.{ext}", mac.name));
    let mut lib = LefLibrary::new();
    lib.macros.push(mac.clone());
    fs::write(&path, lef::to_string(&lib)?)?;
    Ok(path)
}

/// Single library file receiving every macro of a merged run.
///
/// Macros are buffered and the file is rewritten once on [MergedWriter::finish],
/// so it always ends in exactly one `END LIBRARY`.
pub struct MergedWriter {
    path: PathBuf,
    head: String,
    lib: LefLibrary,
}

impl MergedWriter {
    /// A new or truncated file starts with a stamp. Otherwise the existing
    /// macros are kept and new ones follow them.
    pub fn open(path: &Path, truncate: bool) -> LefgenResult<MergedWriter> {
        let head = if truncate || fs::metadata(path).is_err() {
            stamp()
        } else {
            strip_footer(&fs::read_to_string(path)?)
        };
        Ok(MergedWriter {
            path: path.to_path_buf(),
            head,
            lib: LefLibrary::new(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn append(&mut self, mac: &LefMacro) {
        self.lib.macros.push(mac.clone());
    }

    pub fn finish(self) -> LefgenResult<()> {
        let body = lef::to_string(&self.lib)?;
        fs::write(&self.path, self.head + &body)?;
        Ok(())
    }
}

fn stamp() -> String {
    let now = Local::now().format("%Y-%m-%d %H:%M:%S");
    format!("# lefgen {VER}\n# Generated on {now}\n\n")
}

/// Everything before a trailing `END LIBRARY` line
fn strip_footer(text: &str) -> String {
    let trimmed = text.trim_end();
    match trimmed.strip_suffix(FOOTER) {
        Some(rest) if rest.is_empty() || rest.ends_with('\n') => rest.to_string(),
        _ => {
            let mut text = trimmed.to_string();
            if !text.is_empty() {
                text.push('\n');
            }
            text
        }
    }
}

/// Separator bar spanning the terminal
pub fn bar() -> String {
    let width = match terminal_size() {
        Some((Width(w), _)) => w as usize,
        None => 80,
    };
    "-".repeat(width)
}

/// Human-readable batch summary
pub fn summary(reports: &Reports) -> String {
    let mut content = format!(
        "\n{}\n\
        {:<24} | {:<20} | {:>5} | {:>4} | Status\n\
        -------------------------|----------------------|-------|------|--------\n",
        bar(),
        "File",
        "Cell",
        "Pins",
        "OBS"
    );

    for report in reports.iter() {
        let file = Path::new(&report.file)
            .file_name()
            .map(|f| f.to_string_lossy().into_owned())
            .unwrap_or_else(|| report.file.clone());
        let status = if report.ok { "ok" } else { "FAILED" };
        content.push_str(&format!(
            "{:<24} | {:<20} | {:>5} | {:>4} | {}\n",
            file, report.cell, report.pins, report.obstructions, status
        ));
        if !report.ok {
            content.push_str(&format!("    {}\n", report.detail));
        }
    }

    let failed = reports.iter().filter(|r| !r.ok).count();
    content.push_str(&format!(
        "{}\n{} cells, {} failed\n",
        bar(),
        reports.len(),
        failed
    ));
    content
}

/// Writes the reports as CSV to `filename`
pub fn export_csv(reports: &Reports, filename: &Path) -> LefgenResult<()> {
    let mut wtr = csv::Writer::from_path(filename)?;
    for report in reports.iter() {
        wtr.serialize(report)?;
    }
    wtr.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Report;

    fn mac(name: &str) -> LefMacro {
        let mut mac = LefMacro::new(name);
        mac.site = Some("core".into());
        mac
    }

    fn report(cell: &str, ok: bool) -> Report {
        Report {
            file: "/tmp/cells/lib.gds".into(),
            cell: cell.into(),
            pins: 2,
            obstructions: 1,
            ok,
            detail: if ok { String::new() } else { "broken".into() },
        }
    }

    #[test]
    fn separate_file_per_macro() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_separate(dir.path(), "lef", &mac("INVx1")).unwrap();
        assert_eq!(path, dir.path().join("INVx1.lef"));
        let text = fs::read_to_string(&path).unwrap();
        assert!(text.starts_with("MACRO INVx1 ; \n"));
        assert!(text.contains("    SITE core ;\n"));
        assert!(text.ends_with("END INVx1 \nEND LIBRARY \n"));
    }

    #[test]
    fn merged_appends_and_truncates() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lib.lef");

        let mut wtr = MergedWriter::open(&path, false).unwrap();
        wtr.append(&mac("A"));
        wtr.finish().unwrap();

        let mut wtr = MergedWriter::open(&path, false).unwrap();
        wtr.append(&mac("B"));
        wtr.finish().unwrap();

        let text = fs::read_to_string(&path).unwrap();
        assert!(text.starts_with("# lefgen "));
        assert_eq!(text.matches("# lefgen ").count(), 1);
        assert!(text.find("MACRO A").unwrap() < text.find("MACRO B").unwrap());
        assert_eq!(text.matches(FOOTER).count(), 1);
        assert!(text.ends_with("END B \nEND LIBRARY \n"));

        let wtr = MergedWriter::open(&path, true).unwrap();
        wtr.finish().unwrap();
        let text = fs::read_to_string(&path).unwrap();
        assert!(!text.contains("MACRO"));
        assert!(text.ends_with("\nEND LIBRARY \n"));
    }

    #[test]
    fn footer_is_stripped_only_at_the_end() {
        assert_eq!(strip_footer("MACRO A ; \nEND A \nEND LIBRARY \n"), "MACRO A ; \nEND A \n");
        assert_eq!(strip_footer("# notes\n"), "# notes\n");
        assert_eq!(strip_footer(""), "");
        assert_eq!(strip_footer("MACRO XEND LIBRARY"), "MACRO XEND LIBRARY\n");
    }

    #[test]
    fn summary_lists_failures() {
        let reports = vec![report("INVx1", true), report("NAND2x1", false)];
        let text = summary(&reports);
        assert!(text.contains("lib.gds"));
        assert!(text.contains("FAILED"));
        assert!(text.contains("broken"));
        assert!(text.contains("2 cells, 1 failed"));
    }

    #[test]
    fn csv_report() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.csv");
        export_csv(&vec![report("INVx1", true)], &path).unwrap();
        let text = fs::read_to_string(&path).unwrap();
        let mut lines = text.lines();
        assert_eq!(lines.next(), Some("file,cell,pins,obstructions,ok,detail"));
        assert_eq!(lines.next(), Some("/tmp/cells/lib.gds,INVx1,2,1,true,"));
    }
}
