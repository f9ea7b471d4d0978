fn main() -> anyhow::Result<()> {
    submission_tool::cli::main()
}
