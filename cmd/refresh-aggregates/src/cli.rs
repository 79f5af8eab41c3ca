use clap::Parser;

#[derive(Parser, Debug)]
#[command(name = "refresh-aggregates")]
#[command(about = "Recompute cached review totals and averages")]
#[command(version)]
pub struct Cli {
    /// Configuration file (overrides `RV_CONFIG`)
    #[arg(short, long, value_name = "PATH")]
    pub config: Option<String>,

    /// Reviewable types to refresh (all configured types if omitted)
    #[arg(value_name = "TYPE")]
    pub types: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_command_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_types_and_config() {
        let cli = Cli::try_parse_from(["refresh-aggregates", "--config", "prod.toml", "post", "article"]).unwrap();
        assert_eq!(cli.config.as_deref(), Some("prod.toml"));
        assert_eq!(cli.types, vec!["post".to_string(), "article".to_string()]);

        let cli = Cli::try_parse_from(["refresh-aggregates"]).unwrap();
        assert!(cli.config.is_none());
        assert!(cli.types.is_empty());
    }

    #[test]
    fn test_unknown_flags_are_rejected() {
        assert!(Cli::try_parse_from(["refresh-aggregates", "--all"]).is_err());
    }
}
