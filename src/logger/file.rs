/// Daily log file output
///
/// Lines are appended to `logs/orchestrator_YYYY-MM-DD.log`. The file is
/// reopened when the date rolls over. Write failures are swallowed so logging
/// can never take the process down.
use super::config::get_logger_config;
use crate::paths;
use chrono::Local;
use once_cell::sync::Lazy;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::sync::Mutex;

struct LogFile {
    date: String,
    writer: BufWriter<File>,
}

static LOG_FILE: Lazy<Mutex<Option<LogFile>>> = Lazy::new(|| Mutex::new(None));

fn open_for_date(date: &str) -> Option<LogFile> {
    let dir = paths::get_logs_directory();
    std::fs::create_dir_all(&dir).ok()?;
    let path = dir.join(format!("orchestrator_{}.log", date));
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .ok()?;
    Some(LogFile {
        date: date.to_string(),
        writer: BufWriter::new(file),
    })
}

pub fn init_file_logging() {
    if !get_logger_config().file_logging_enabled {
        return;
    }
    let today = Local::now().format("%Y-%m-%d").to_string();
    if let Ok(mut guard) = LOG_FILE.lock() {
        *guard = open_for_date(&today);
    }
}

pub fn write_to_file(line: &str) {
    let Ok(mut guard) = LOG_FILE.lock() else {
        return;
    };
    // Not initialized: console only
    let Some(current) = guard.as_ref() else {
        return;
    };

    let today = Local::now().format("%Y-%m-%d").to_string();
    if current.date != today {
        if let Some(log) = guard.as_mut() {
            let _ = log.writer.flush();
        }
        *guard = open_for_date(&today);
    }

    if let Some(log) = guard.as_mut() {
        let _ = writeln!(log.writer, "{}", line);
    }
}

pub fn flush_file_logging() {
    if let Ok(mut guard) = LOG_FILE.lock() {
        if let Some(log) = guard.as_mut() {
            let _ = log.writer.flush();
        }
    }
}
