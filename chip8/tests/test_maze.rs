use chip8::{constants::*, prelude::*};

const MAZE: &[u8] = include_bytes!("../programs/maze");

#[test]
fn test_maze_runs_to_completion() {
    let mut vm = Chip8Vm::new(Chip8Conf { rng_seed: Some(42) });
    vm.load_program(MAZE).unwrap();

    vm.run_steps(2000).unwrap();

    // Program ends in a tight `JP 0x218` loop.
    assert_eq!(vm.pc(), 0x218);
    assert_eq!(vm.registers()[0], 0x00);
    assert_eq!(vm.registers()[1], 0x20);
    assert_eq!(vm.registers()[0xF], 0);
    assert!(vm.draw_pending());

    // 8 rows of 16 cells, each a diagonal of 4 pixels.
    let lit = vm.read_framebuffer().iter().filter(|px| **px).count();
    assert_eq!(lit, 16 * 8 * 4);

    let dump = vm.dump_display().unwrap();
    assert_eq!(dump.lines().count(), DISPLAY_HEIGHT);
    assert!(dump.lines().all(|line| line.len() == DISPLAY_WIDTH));
}

#[test]
fn test_maze_is_seeded() {
    let run = |seed| {
        let mut vm = Chip8Vm::new(Chip8Conf {
            rng_seed: Some(seed),
        });
        vm.load_program(MAZE).unwrap();
        vm.run_steps(2000).unwrap();
        vm.dump_display().unwrap()
    };

    assert_eq!(run(3), run(3));
}
