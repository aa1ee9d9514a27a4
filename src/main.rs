fn main() {
    pgo::start_cli();
}
