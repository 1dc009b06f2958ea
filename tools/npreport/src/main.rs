use anyhow::Result;
use clap::Parser;
use lazy_static::lazy_static;
use regex::Regex;
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};

lazy_static! {
    static ref SITE_HEADER: Regex = Regex::new(r"^(call_site#\S+):$").unwrap();
    static ref OBJECT_HEADER: Regex = Regex::new(r"^  #\d+ object@").unwrap();
}

/// A saved numaperf report, split into one block of lines per call site.
#[derive(Debug)]
struct Report {
    preamble: Vec<String>,
    sites: Vec<(String, Vec<String>)>,
}

impl Report {
    fn parse(text: &str) -> Self {
        let mut preamble = vec![];
        let mut sites: Vec<(String, Vec<String>)> = vec![];
        for line in text.lines() {
            if let Some(caps) = SITE_HEADER.captures(line) {
                sites.push((caps[1].to_string(), vec![]));
            } else if let Some((_, block)) = sites.last_mut() {
                block.push(line.to_string());
            } else {
                preamble.push(line.to_string());
            }
        }
        Report { preamble, sites }
    }

    fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = if path.extension().and_then(|e| e.to_str()) == Some("zst") {
            let file = std::fs::File::open(path)?;
            let mut decoder = zstd::Decoder::new(file)?;
            let mut buf = String::new();
            io::Read::read_to_string(&mut decoder, &mut buf)?;
            buf
        } else {
            std::fs::read_to_string(path)?
        };
        Ok(Report::parse(&text))
    }

    fn matching(&self, pattern: &Regex) -> impl Iterator<Item = &(String, Vec<String>)> {
        self.sites.iter().filter(move |(name, _)| pattern.is_match(name))
    }
}

fn print_site(name: &str, block: &[String]) {
    println!("{name}:");
    for line in block {
        println!("{line}");
    }
}

fn print_object_count(name: &str, block: &[String]) {
    let count = block.iter().filter(|l| OBJECT_HEADER.is_match(l)).count();
    println!("{name}: {count} object(s)");
}

#[derive(Parser, Debug)]
#[command(about = "Inspect and filter a saved numaperf report")]
struct Args {
    /// Path to a saved report (plain text or .zst-compressed).
    report_path: PathBuf,
}

fn main() -> Result<()> {
    let args = Args::parse();
    let report = Report::load(&args.report_path)?;
    for line in &report.preamble {
        println!("{line}");
    }
    println!("loaded {} call site(s); type 'help' for commands", report.sites.len());
    loop {
        print!("> ");
        io::stdout().flush()?;
        let mut buffer = String::new();
        if io::stdin().lock().read_line(&mut buffer)? == 0 {
            break;
        }
        let parts: Vec<&str> = buffer.trim().split(' ').collect();
        match parts[0] {
            "quit" => break,
            "" => {}
            "help" => {
                println!("quit");
                println!("help");
                println!("list                 - summarize every call site");
                println!("show <regex>         - print call sites matching <regex>");
            }
            "list" => {
                for (name, block) in &report.sites {
                    print_object_count(name, block);
                }
            }
            "show" => {
                let pattern = parts.get(1).copied().unwrap_or(".*");
                match Regex::new(pattern) {
                    Ok(re) => {
                        for (name, block) in report.matching(&re) {
                            print_site(name, block);
                        }
                    }
                    Err(e) => println!("invalid pattern: {e}"),
                }
            }
            _ => {
                println!("unrecognized command, try 'help'");
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_sites_and_their_blocks() {
        let text = "numaperf report: 1 call site(s) with findings\ncall_site#3:\n  #1 object@0x1000 size=64 site=call_site#3 score=9\n";
        let report = Report::parse(text);
        assert_eq!(report.preamble.len(), 1);
        assert_eq!(report.sites.len(), 1);
        assert_eq!(report.sites[0].0, "call_site#3");
        assert_eq!(report.sites[0].1.len(), 1);
    }

    #[test]
    fn matching_filters_by_regex() {
        let text = "call_site#1:\n  line a\ncall_site#2:\n  line b\n";
        let report = Report::parse(text);
        let re = Regex::new("call_site#1").unwrap();
        let matched: Vec<_> = report.matching(&re).collect();
        assert_eq!(matched.len(), 1);
        assert_eq!(matched[0].0, "call_site#1");
    }
}
