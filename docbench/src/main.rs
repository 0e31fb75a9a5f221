fn main() -> anyhow::Result<()> {
    docbench::cli::execute()
}
