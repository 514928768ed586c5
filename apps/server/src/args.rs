use std::env;

#[derive(Debug, Default)]
pub struct CliArgs {
    pub listen: Option<String>,
    pub db_path: Option<String>,
    pub read_only: bool,
    pub remote_url: Option<String>,
    pub plan: Option<String>,
    pub block_start: Option<String>,
    pub timezone: Option<String>,
    pub token_limit: Option<u64>,
}

pub fn parse_args() -> Result<CliArgs, String> {
    let mut args = env::args().skip(1);
    let mut parsed = CliArgs::default();

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--listen" => {
                parsed.listen = Some(required_value(&mut args, "--listen")?);
            }
            "--db" => {
                parsed.db_path = Some(required_value(&mut args, "--db")?);
            }
            "--read-only" => {
                parsed.read_only = true;
            }
            "--remote" => {
                parsed.remote_url = Some(required_value(&mut args, "--remote")?);
            }
            "--plan" => {
                parsed.plan = Some(required_value(&mut args, "--plan")?);
            }
            "--block-start" => {
                parsed.block_start = Some(required_value(&mut args, "--block-start")?);
            }
            "--timezone" => {
                parsed.timezone = Some(required_value(&mut args, "--timezone")?);
            }
            "--token-limit" => {
                let value = required_value(&mut args, "--token-limit")?;
                let limit = value
                    .parse::<u64>()
                    .map_err(|_| format!("invalid token limit: {value}"))?;
                parsed.token_limit = Some(limit);
            }
            "--help" | "-h" => {
                print_help();
                std::process::exit(0);
            }
            _ => {
                return Err(format!("unknown argument: {arg}"));
            }
        }
    }

    if parsed.remote_url.is_some() && parsed.db_path.is_some() {
        return Err("--remote and --db are mutually exclusive".to_string());
    }

    Ok(parsed)
}

fn required_value(args: &mut impl Iterator<Item = String>, flag: &str) -> Result<String, String> {
    args.next()
        .ok_or_else(|| format!("missing value for {flag}"))
}

pub fn print_help() {
    println!(
        "Usage Monitor\n\n\
Usage:\n  usage-monitor [options]\n\n\
Options:\n  \
--listen <addr>        Address to serve on (default 127.0.0.1:4318)\n  \
--db <path>            Database file (default usage.db)\n  \
--read-only            Serve queries only; reject writes\n  \
--remote <url>         Answer queries from another instance's API\n  \
--plan <name>          Subscription plan: pro, max or max20\n  \
--block-start <hour>   Rate-limit block start, 0-23 or e.g. 10am\n  \
--timezone <name>      IANA timezone for block boundaries (default UTC)\n  \
--token-limit <n>      Tokens per 5-hour block, 0 for unlimited\n  \
-h, --help             Show this help message\n"
    );
}
