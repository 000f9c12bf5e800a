use std::collections::{BTreeSet, HashMap};
use std::error::Error;
use std::ffi::OsStr;
use std::fmt;
use std::path::PathBuf;

use csv::Writer;

use super::eval::EvalResult;

// Logger class for logging training and evaluation data
pub trait Logger {
    // log a piece of data
    fn log(&mut self, data: LogItem);

    // dump the entire training data
    fn dump(&self) -> Result<(), Box<dyn Error>>;

    // check whether logging is possible. Could check
    // e.g. whether directories exist or whether the dump
    // file is already taken. if try_to_fix, then the Logger
    // will try to resolve the issue, e.g. by creating the dir
    fn check_can_log(&self, try_to_fix: bool) -> Result<(), &str>;
}

#[derive(Debug, Clone, PartialEq)]
pub enum LogData {
    String(String),
    Float(f32),
    Int(i32),
}

impl fmt::Display for LogData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogData::String(s) => write!(f, "{s}"),
            LogData::Float(v) => write!(f, "{v}"),
            LogData::Int(v) => write!(f, "{v}"),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct LogItem {
    items: HashMap<String, LogData>,
}

impl LogItem {
    pub fn push(mut self, k: String, v: LogData) -> Self {
        self.items.insert(k, v);

        self
    }

    pub fn get(&self, k: &str) -> Option<&LogData> {
        self.items.get(k)
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

impl fmt::Display for LogItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut keys: Vec<&String> = self.items.keys().collect();
        keys.sort();

        for (i, k) in keys.into_iter().enumerate() {
            if i > 0 {
                write!(f, " ")?;
            }
            write!(f, "{k}={}", self.items[k])?;
        }

        Ok(())
    }
}

impl From<EvalResult> for LogItem {
    fn from(value: EvalResult) -> Self {
        LogItem::default()
            .push(
                "eval_ep_mean_len".to_string(),
                LogData::Float(value.mean_len),
            )
            .push(
                "eval_ep_mean_rew".to_string(),
                LogData::Float(value.mean_reward),
            )
            .push(
                "eval_ep_std_rew".to_string(),
                LogData::Float(value.std_reward),
            )
    }
}

pub struct CsvLogger {
    overwrite: bool,
    dump_path: PathBuf,
    to_stdout: bool,
    data: Vec<LogItem>,
}

impl CsvLogger {
    pub fn new(dump_path: PathBuf, to_stdout: bool, overwrite: bool) -> Self {
        Self {
            dump_path,
            to_stdout,
            data: Vec::new(),
            overwrite,
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

impl Logger for CsvLogger {
    fn log(&mut self, data: LogItem) {
        if data.is_empty() {
            return;
        }

        if self.to_stdout {
            tracing::info!("{data}");
        }

        self.data.push(data);
    }

    fn dump(&self) -> Result<(), Box<dyn Error>> {
        tracing::info!(
            path = ?self.dump_path,
            items = self.data.len(),
            "dumping training logs"
        );

        let mut wtr = Writer::from_path(&self.dump_path)?;

        // union of all keys, sorted so the column order is stable
        let headers: BTreeSet<&String> = self
            .data
            .iter()
            .flat_map(|record| record.items.keys())
            .collect();
        let headers: Vec<&String> = headers.into_iter().collect();

        wtr.write_record(&headers)?;

        for record in &self.data {
            let row: Vec<String> = headers
                .iter()
                .map(|key| {
                    record
                        .items
                        .get(*key)
                        .map(|v| v.to_string())
                        .unwrap_or_default()
                })
                .collect();
            wtr.write_record(&row)?;
        }

        wtr.flush()?;

        Ok(())
    }

    fn check_can_log(&self, try_to_fix: bool) -> Result<(), &str> {
        let parent = self
            .dump_path
            .parent()
            .filter(|p| !p.as_os_str().is_empty());

        if self.dump_path.exists() && !self.overwrite {
            Err("logger dump file already exists")
        } else if self.dump_path.extension() != Some(OsStr::new("csv")) {
            Err("logger dump path should be a csv")
        } else if parent.is_some_and(|p| !p.exists()) {
            if try_to_fix {
                parent
                    .map(std::fs::create_dir_all)
                    .transpose()
                    .map(|_| ())
                    .map_err(|_| "Couldn't create directory")
            } else {
                Err("logger dump path dir does not exist")
            }
        } else {
            Ok(())
        }
    }
}
