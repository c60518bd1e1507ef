use clap::{Arg, ArgAction, Command};

fn page_arg() -> Arg {
    Arg::new("page")
        .short('p')
        .long("page")
        .help("Page the item is listed on")
        .default_value("1")
        .value_parser(clap::value_parser!(u32).range(1..))
}

fn yes_arg() -> Arg {
    Arg::new("yes")
        .short('y')
        .long("yes")
        .help("Skip the confirmation prompt")
        .action(ArgAction::SetTrue)
}

fn id_arg() -> Arg {
    Arg::new("id").help("Registration id").required(true)
}

pub fn with_subcommands(command: Command) -> Command {
    command
        .subcommand(
            Command::new("list")
                .about("Show one page of a dashboard list")
                .arg(
                    Arg::new("kind")
                        .help("List to show")
                        .value_parser(["pending", "submitted", "activities"])
                        .default_value("pending"),
                )
                .arg(page_arg().help("Page to show"))
                .arg(
                    Arg::new("filter")
                        .short('f')
                        .long("filter")
                        .help("Filter as field=value, example: search_name=ada")
                        .action(ArgAction::Append),
                )
                .arg(
                    Arg::new("summary")
                        .long("summary")
                        .help("Also print the dashboard counters")
                        .action(ArgAction::SetTrue),
                ),
        )
        .subcommand(
            Command::new("finalize")
                .about("Move a pending registration to submitted")
                .arg(id_arg())
                .arg(page_arg())
                .arg(yes_arg()),
        )
        .subcommand(
            Command::new("revert")
                .about("Move a submitted registration back to pending")
                .arg(id_arg())
                .arg(page_arg())
                .arg(yes_arg()),
        )
        .subcommand(
            Command::new("delete")
                .about("Delete a registration")
                .arg(id_arg())
                .arg(
                    Arg::new("kind")
                        .short('k')
                        .long("kind")
                        .help("List the registration is on")
                        .value_parser(["pending", "submitted"])
                        .default_value("pending"),
                )
                .arg(page_arg())
                .arg(yes_arg()),
        )
        .subcommand(
            Command::new("photo")
                .about("Fetch the photo attached to a registration")
                .arg(id_arg())
                .arg(
                    Arg::new("output")
                        .short('o')
                        .long("output")
                        .help("Write the data URL to this file instead of stdout"),
                ),
        )
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::with_subcommands;
    use clap::Command;

    fn command() -> Command {
        with_subcommands(Command::new("intake"))
    }

    #[test]
    fn list_collects_filters() {
        let matches = command().get_matches_from(vec![
            "intake",
            "list",
            "activities",
            "-f",
            "search_term=flu",
            "--filter",
            "status_filter=open",
        ]);
        let sub = matches.subcommand_matches("list").unwrap();
        assert_eq!(
            sub.get_one::<String>("kind").cloned(),
            Some("activities".to_string())
        );
        let filters: Vec<&String> = sub.get_many::<String>("filter").unwrap().collect();
        assert_eq!(filters, ["search_term=flu", "status_filter=open"]);
        assert_eq!(sub.get_one::<u32>("page").copied(), Some(1));
    }

    #[test]
    fn delete_rejects_activities() {
        let result =
            command().try_get_matches_from(vec!["intake", "delete", "r1", "--kind", "activities"]);
        assert!(result.is_err());
    }

    #[test]
    fn page_zero_is_rejected() {
        let result = command().try_get_matches_from(vec!["intake", "finalize", "r1", "-p", "0"]);
        assert!(result.is_err());
    }
}
