//! Builds the YAAP object tree of a board.
use yaap_server::{
    classes::{
        CpuDebug, Device, HdtClass, I2cClass, JtagClass, Lpc, LpcPostCodeClass,
        LpcRomEmulationClass, RelayClass, SystemClass,
    },
    hal::{HdtHal, HeaderHal, I2cHal, JtagHal, LpcPostCodeHal, RelayHal, SystemHal, TriggersHal},
    registry::Registry,
};

use crate::backends::sim::SimBoard;

/// Idle TCK cycles issued around every shift.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct ShiftClocks {
    pub pre: u32,
    pub post: u32,
}

pub fn system_hal(board: &SimBoard) -> SystemHal {
    SystemHal::new(board.system.clone())
        .with_firmware(board.system.clone())
        .with_boards(board.system.clone())
        .with_reset(board.system.clone())
}

fn header_hal(board: &SimBoard) -> HeaderHal {
    HeaderHal::new(board.header.clone())
        .with_enable(board.header.clone())
        .with_change_detect(board.header.clone())
        .with_trst(board.header.clone())
}

fn hdt_hal(board: &SimBoard) -> HdtHal {
    let hdt = board.hdt.clone();
    HdtHal::new(hdt.clone(), header_hal(board))
        .with_triggers(TriggersHal::new(hdt.clone()).with_manual(hdt.clone()))
        .with_dbrdy_snapshot(hdt.clone())
        .with_dbreq_source_snapshot(hdt.clone())
        .with_reset(hdt.clone())
        .with_pwrok(hdt.clone())
        .with_dbreq_on_dbrdy(hdt.clone())
        .with_dbreq_on_reset(hdt.clone())
        .with_dbreq_on_trigger(hdt.clone())
        .with_pulse_width(hdt.clone())
        .with_dbrdy_mask(hdt)
}

/// Register every object of `board`. The device object is registered first.
pub fn build_registry(board: &SimBoard, system: &SystemHal, clocks: ShiftClocks) -> Registry {
    let mut registry = Registry::new();
    registry.register_device("device", Device::new(system.clone()));
    registry.register("system", SystemClass::new(system.clone()));

    let jtag_hal = JtagHal::new(board.jtag.clone())
        .with_header(header_hal(board))
        .with_tap_state(board.jtag.clone())
        .with_tck_frequency(board.jtag.clone());
    let cpu_debug = registry.register("cpuDebug", CpuDebug);
    let jtag = registry.register("jtag", JtagClass::new(jtag_hal, clocks.pre, clocks.post));
    let hdt = registry.register("hdt", HdtClass::new(hdt_hal(board)));
    registry.add_member(cpu_debug, jtag);
    registry.add_member(cpu_debug, hdt);

    for (idx, relay) in board.relays.iter().enumerate() {
        let hal = RelayHal::new(relay.clone()).with_pulse(relay.clone());
        registry.register(&format!("relay{}", idx), RelayClass::new(hal));
    }

    let i2c = I2cHal::new(board.i2c.clone()).with_scl_frequency(board.i2c.clone());
    registry.register("i2c", I2cClass::new(i2c));

    let lpc = registry.register("lpc", Lpc);
    let post_code = LpcPostCodeHal::new(board.post_code.clone()).with_fifo(board.post_code.clone());
    let post_code = registry.register("postCode", LpcPostCodeClass::new(post_code));
    let rom = registry.register("romEmulation", LpcRomEmulationClass::new(board.rom.clone()));
    registry.add_member(lpc, post_code);
    registry.add_member(lpc, rom);

    log::debug!("Registered {} objects", registry.directory().len());
    registry
}

#[cfg(test)]
mod test {
    use super::{ShiftClocks, build_registry, system_hal};
    use crate::backends::sim::{JtagMode, SimBoard};

    #[test]
    fn registers_expected_tree() {
        let board = SimBoard::new("sim", JtagMode::Hardware);
        let system = system_hal(&board);
        let registry = build_registry(&board, &system, ShiftClocks { pre: 5, post: 5 });
        let directory = registry.directory();

        assert_eq!(directory.find("device"), Some(0));
        let roots: Vec<_> = directory
            .root_members()
            .map(|(_, node)| node.name.clone())
            .collect();
        assert_eq!(
            roots,
            vec![
                "device", "system", "cpuDebug", "relay0", "relay1", "relay2", "relay3", "i2c",
                "lpc"
            ]
        );
        let cpu_debug = directory.find("cpuDebug").unwrap();
        let members = &directory.get(cpu_debug).unwrap().members;
        assert_eq!(members.len(), 2);
        assert_eq!(directory.get(members[0]).unwrap().name, "jtag");
    }
}
