use ingress_policy::cli;

fn main() -> anyhow::Result<()> {
    cli::run_cli()
}
