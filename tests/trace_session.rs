use w65_tracer::registers::vector_cell;
use w65_tracer::snapshot;
use w65_tracer::{CpuRegisters, FlatMemory, Reference, ReferenceKind, Tracer, VectorId};

// Small reset routine: JSR to a helper that loops on a counter, then spins.
//   8000: JSR $8010
//   8003: BRA $8003
//   8010: LDX #$03
//   8012: DEX
//   8013: BNE $8012
//   8015: RTS
fn load_program(bus: &mut FlatMemory) {
    bus.write_u16(vector_cell::RESET as u32, 0x8000);
    bus.load(0x8000, &[0x20, 0x10, 0x80, 0x80, 0xFE]);
    bus.load(0x8010, &[0xA2, 0x03, 0xCA, 0xD0, 0xFD, 0x60]);
}

// Walks the program by hand the way an emulator core would.
fn run(tracer: &mut Tracer, bus: &mut FlatMemory) {
    let mut regs = CpuRegisters::new();
    regs.pc = 0x8000;
    tracer.trace(&regs, &*bus);

    // JSR pushes $8002.
    bus.write_u16(0x01FE, 0x8002);
    regs.sp = 0x01FD;
    regs.vector = 0;

    regs.pc = 0x8010;
    tracer.trace(&regs, &*bus);
    for _ in 0..3 {
        for pc in [0x8012, 0x8013] {
            regs.pc = pc;
            tracer.trace(&regs, &*bus);
        }
    }
    regs.pc = 0x8015;
    tracer.trace(&regs, &*bus);

    regs.sp = 0x01FF;
    for _ in 0..10 {
        regs.pc = 0x8003;
        tracer.trace(&regs, &*bus);
    }
}

#[test]
fn test_session_snapshot_on_disk() {
    let mut bus = FlatMemory::new();
    load_program(&mut bus);
    let mut tracer = Tracer::new();
    run(&mut tracer, &mut bus);

    let stats = tracer.stats();
    assert_eq!(stats.instructions, 6);
    assert_eq!(stats.pending_calls, 0);

    let path = std::env::temp_dir().join(format!("w65-tracer-session-{}.db", std::process::id()));
    let _ = std::fs::remove_file(&path);
    let summary = tracer.flush_to_path(&path).unwrap();
    assert_eq!(summary.instructions, 6);
    assert_eq!(summary.subroutines, 1);

    let graph = snapshot::load_from_path(&path).unwrap();
    let _ = std::fs::remove_file(&path);

    assert_eq!(graph, tracer.graph());
    assert_eq!(graph.subroutines, vec![0x8010]);
    assert_eq!(graph.vector(VectorId::Reset), Some(0x8000));
    assert_eq!(graph.nonstandard_returns().count(), 0);
    assert_eq!(
        graph.references,
        vec![
            Reference::new(0x8000, 0x8010, ReferenceKind::Direct),
            Reference::new(0x8003, 0x8003, ReferenceKind::Direct),
            Reference::new(0x8013, 0x8012, ReferenceKind::Direct),
        ]
    );
    assert_eq!(graph.instruction(0x8010).unwrap().to_string(), "LDX #$03");
}
