use petrel::chess::game::GameState;
use petrel::search::parallel::ParallelSearcher;
use petrel::uci;

fn main() {
    println!("petrel");

    let mut game = GameState::default();
    let mut engine = ParallelSearcher::new();

    let args: Vec<String> = std::env::args().collect();

    if args.len() > 1 {
        let command = args[1..].join(" ");
        uci::run_command(&command, &mut game, &mut engine);
        return;
    }

    let mut input = String::new();

    loop {
        let bytes = std::io::stdin()
            .read_line(&mut input)
            .expect("error reading input");

        if bytes == 0 {
            return;
        }

        uci::run_command(&input, &mut game, &mut engine);
        input.clear();
    }
}
