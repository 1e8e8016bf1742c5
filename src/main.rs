use rmcc::driver;

fn main() -> anyhow::Result<()> {
    driver::run()
}
