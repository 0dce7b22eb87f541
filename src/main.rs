fn main() -> anyhow::Result<()> {
    query_link::run()
}
