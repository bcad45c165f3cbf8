fn main() -> anyhow::Result<()> {
    notepad::cli::run()
}
