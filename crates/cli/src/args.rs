//! Command-line argument parsing.

use anyhow::{Result, bail};

pub const USAGE: &str = "usage:
  larder [--head] <url>...   fetch URLs through the cache, one JSON line per URL
  larder --clear             remove every entry from the store
  larder --help              show this message

configuration comes from LARDER_* environment variables and LARDER_CONFIG_FILE";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Fetch { head: bool, urls: Vec<String> },
    Clear,
    Help,
}

pub fn parse(args: impl IntoIterator<Item = String>) -> Result<Command> {
    let mut head = false;
    let mut clear = false;
    let mut urls = Vec::new();

    for arg in args {
        match arg.as_str() {
            "-h" | "--help" => return Ok(Command::Help),
            "--head" => head = true,
            "--clear" => clear = true,
            flag if flag.starts_with('-') => bail!("unknown option: {flag}\n\n{USAGE}"),
            _ => urls.push(arg),
        }
    }

    if clear {
        if head || !urls.is_empty() {
            bail!("--clear takes no other arguments\n\n{USAGE}");
        }
        return Ok(Command::Clear);
    }
    if urls.is_empty() {
        bail!("no URLs given\n\n{USAGE}");
    }
    Ok(Command::Fetch { head, urls })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_parse_urls() {
        let command = parse(args(&["http://a.test/", "http://b.test/"])).unwrap();
        assert_eq!(command, Command::Fetch { head: false, urls: args(&["http://a.test/", "http://b.test/"]) });
    }

    #[test]
    fn test_parse_head() {
        let command = parse(args(&["--head", "http://a.test/"])).unwrap();
        assert_eq!(command, Command::Fetch { head: true, urls: args(&["http://a.test/"]) });
    }

    #[test]
    fn test_parse_clear() {
        assert_eq!(parse(args(&["--clear"])).unwrap(), Command::Clear);
        assert!(parse(args(&["--clear", "http://a.test/"])).is_err());
    }

    #[test]
    fn test_parse_help_wins() {
        assert_eq!(parse(args(&["http://a.test/", "--help"])).unwrap(), Command::Help);
    }

    #[test]
    fn test_parse_errors() {
        assert!(parse(args(&[])).is_err());
        assert!(parse(args(&["--bogus", "http://a.test/"])).is_err());
    }
}
