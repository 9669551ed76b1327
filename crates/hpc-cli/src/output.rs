use std::io::Write;

use hpc_client::{FileContent, JobId, JobStatus, RemoteDirEntry, SubmittedJob};
use serde::Serialize;
use serde_json::json;

/// Writes command results either as plain text or as one JSON document.
pub(crate) struct Printer<W> {
    out: W,
    json: bool,
}

impl<W: Write> Printer<W> {
    pub(crate) fn new(out: W, json: bool) -> Self {
        Self { out, json }
    }

    pub(crate) fn entries(&mut self, entries: &[RemoteDirEntry]) -> anyhow::Result<()> {
        if self.json {
            return self.write_json(&entries);
        }
        for entry in entries {
            let name = if entry.is_directory {
                format!("{}/", entry.name)
            } else {
                entry.name.clone()
            };
            writeln!(self.out, "{:>6}  {:<12}  {}", entry.size, entry.modified, name)?;
        }
        Ok(())
    }

    pub(crate) fn names(&mut self, names: &[String]) -> anyhow::Result<()> {
        if self.json {
            return self.write_json(&names);
        }
        for name in names {
            writeln!(self.out, "{name}")?;
        }
        Ok(())
    }

    pub(crate) fn file(&mut self, content: &FileContent) -> anyhow::Result<()> {
        if self.json {
            return self.write_json(content);
        }
        writeln!(self.out, "{}", content.text)?;
        if content.truncated {
            writeln!(self.out, "... (truncated)")?;
        }
        Ok(())
    }

    pub(crate) fn script(&mut self, script: &str) -> anyhow::Result<()> {
        if self.json {
            return self.write_json(&json!({ "script": script }));
        }
        write!(self.out, "{script}")?;
        Ok(())
    }

    pub(crate) fn submitted(&mut self, job: &SubmittedJob) -> anyhow::Result<()> {
        if self.json {
            return self.write_json(job);
        }
        match &job.remote_script {
            Some(script) => writeln!(self.out, "Submitted batch job {} ({script})", job.job_id)?,
            None => writeln!(self.out, "Submitted batch job {}", job.job_id)?,
        }
        Ok(())
    }

    pub(crate) fn status(&mut self, job_id: &JobId, status: &JobStatus) -> anyhow::Result<()> {
        if self.json {
            return self.write_json(&json!({ "job_id": job_id, "status": status }));
        }
        writeln!(self.out, "{job_id} {status}")?;
        Ok(())
    }

    pub(crate) fn transferred(&mut self, from: &str, to: &str) -> anyhow::Result<()> {
        if self.json {
            return self.write_json(&json!({ "from": from, "to": to }));
        }
        writeln!(self.out, "{from} -> {to}")?;
        Ok(())
    }

    fn write_json<T: Serialize + ?Sized>(&mut self, value: &T) -> anyhow::Result<()> {
        serde_json::to_writer_pretty(&mut self.out, value)?;
        writeln!(self.out)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(name: &str, is_directory: bool) -> RemoteDirEntry {
        RemoteDirEntry {
            name: name.to_string(),
            size: "4.0K".to_string(),
            modified: "Nov 18 13:50".to_string(),
            is_directory,
        }
    }

    #[test]
    fn human_listing_marks_directories() {
        let mut buf = Vec::new();
        Printer::new(&mut buf, false)
            .entries(&[entry("anat", true), entry("notes.txt", false)])
            .expect("print");
        let text = String::from_utf8(buf).expect("utf8");
        let lines: Vec<&str> = text.lines().collect();
        assert!(lines[0].ends_with("anat/"));
        assert!(lines[1].ends_with("notes.txt"));
    }

    #[test]
    fn json_status_uses_scheduler_tokens() {
        let mut buf = Vec::new();
        let job_id = JobId::parse("88210").expect("job id");
        Printer::new(&mut buf, true)
            .status(&job_id, &JobStatus::Running)
            .expect("print");
        let value: serde_json::Value = serde_json::from_slice(&buf).expect("json");
        assert_eq!(value["job_id"], "88210");
        assert_eq!(value["status"], "RUNNING");
    }

    #[test]
    fn truncated_file_is_flagged() {
        let mut buf = Vec::new();
        let content = FileContent {
            text: "line 1\nline 2".to_string(),
            truncated: true,
        };
        Printer::new(&mut buf, false).file(&content).expect("print");
        let text = String::from_utf8(buf).expect("utf8");
        assert!(text.ends_with("... (truncated)\n"));
    }
}
