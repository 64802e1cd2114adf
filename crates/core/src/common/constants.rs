//! Constants shared by the exerciser tests.

/// First test number of the exerciser module.
pub const EXERCISER_TEST_NUM_BASE: u32 = 800;

/// PCI class code (base, sub-class, programming interface) advertised by exercisers.
pub const EXERCISER_CLASSCODE: u32 = 0x00ED_0113;

/// Size of the coherent buffer allocated per I/O coherency trial.
pub const TEST_DATA_BLK_SIZE: usize = 512;

/// Sentinel byte written to the DMA source half.
pub const TEST_DATA: u8 = 0xDE;

/// Status code recorded with every FAIL/ERROR outcome of the exerciser tests.
pub const STATUS_CODE_FAIL: u32 = 0x02;

/// Status code recorded by the legacy interrupt test on success.
pub const STATUS_CODE_INTR_PASS: u32 = 0x01;

/// Configuration-space offset of the Interrupt Line register.
pub const PCIE_INTERRUPT_LINE: u16 = 0x3C;

/// Configuration-space offset of the Interrupt Pin register.
pub const PCIE_INTERRUPT_PIN: u16 = 0x3D;
