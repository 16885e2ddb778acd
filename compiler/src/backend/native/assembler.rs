//! A minimal x86-64 encoder covering the instruction forms the native
//! backend emits. Branches are emitted against labels and patched with
//! rel32 displacements once the code is complete.

use crate::error::CompileError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Reg {
    Rax = 0,
    Rcx = 1,
    Rdx = 2,
    Rsi = 6,
    Rdi = 7,
    R8 = 8,
    R9 = 9,
    R10 = 10,
    R11 = 11,
}

impl Reg {
    fn low(self) -> u8 {
        (self as u8) & 0b111
    }

    fn high(self) -> u8 {
        (self as u8) >> 3
    }
}

/// The condition codes used by `jcc`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Cond {
    /// Unsigned below, also carry set.
    Below = 0x2,
    AboveOrEqual = 0x3,
    Equal = 0x4,
    NotEqual = 0x5,
    BelowOrEqual = 0x6,
    Above = 0x7,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Label(usize);

/// A memory operand of the form `[base + index * scale + disp]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Mem {
    base: Reg,
    index: Option<(Reg, u8)>,
    disp: i32,
}

impl Mem {
    pub fn base(base: Reg) -> Self {
        Self {
            base,
            index: None,
            disp: 0,
        }
    }

    pub fn indexed(base: Reg, index: Reg, scale: u8, disp: i32) -> Self {
        Self {
            base,
            index: Some((index, scale)),
            disp,
        }
    }
}

#[derive(Debug, Default)]
pub struct Assembler {
    code: Vec<u8>,
    labels: Vec<Option<usize>>,
    fixups: Vec<(usize, Label)>,
}

impl Assembler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn new_label(&mut self) -> Label {
        self.labels.push(None);
        Label(self.labels.len() - 1)
    }

    pub fn bind(&mut self, label: Label) {
        self.labels[label.0] = Some(self.code.len());
    }

    /// Patches every branch and returns the finished code.
    pub fn finish(mut self) -> Result<Vec<u8>, CompileError> {
        for (at, label) in std::mem::take(&mut self.fixups) {
            let target = self.labels[label.0].ok_or_else(|| {
                CompileError::BackendLowering(format!("label {} was never bound", label.0))
            })?;

            // displacements are relative to the end of the rel32 field.
            let rel = i32::try_from(target as i64 - (at as i64 + 4)).map_err(|_| {
                CompileError::BackendLowering("branch displacement out of range".to_string())
            })?;
            self.code[at..at + 4].copy_from_slice(&rel.to_le_bytes());
        }

        Ok(self.code)
    }

    fn byte(&mut self, b: u8) {
        self.code.push(b);
    }

    fn imm32(&mut self, imm: u32) {
        self.code.extend_from_slice(&imm.to_le_bytes());
    }

    fn rel32(&mut self, label: Label) {
        self.fixups.push((self.code.len(), label));
        self.imm32(0);
    }

    fn rex(&mut self, wide: bool, reg: u8, index: u8, base: u8) {
        let rex = 0x40 | (u8::from(wide) << 3) | (reg << 2) | (index << 1) | base;
        if rex != 0x40 {
            self.byte(rex);
        }
    }

    fn modrm(&mut self, mode: u8, reg: u8, rm: u8) {
        self.byte((mode << 6) | ((reg & 0b111) << 3) | (rm & 0b111));
    }

    /// Encodes a register operand against a memory operand.
    fn mem_operand(&mut self, wide: bool, opcode: &[u8], reg: u8, mem: Mem) {
        let index = mem.index.map_or(0, |(index, _)| index.high());
        self.rex(wide, reg >> 3, index, mem.base.high());
        self.code.extend_from_slice(opcode);

        let mode = match mem.disp {
            0 if mem.base.low() != 0b101 => 0b00,
            d if i8::try_from(d).is_ok() => 0b01,
            _ => 0b10,
        };

        match mem.index {
            Some((index, scale)) => {
                let ss = match scale {
                    1 => 0,
                    2 => 1,
                    4 => 2,
                    _ => 3,
                };
                self.modrm(mode, reg, 0b100);
                self.byte((ss << 6) | (index.low() << 3) | mem.base.low());
            }
            None => {
                self.modrm(mode, reg, mem.base.low());
                if mem.base.low() == 0b100 {
                    self.byte(0x24);
                }
            }
        }

        match mode {
            0b01 => self.byte(mem.disp as i8 as u8),
            0b10 => self.imm32(mem.disp as u32),
            _ => (),
        }
    }

    /// Encodes a 64-bit register to register operation `op dst, src`.
    fn reg_reg(&mut self, opcode: u8, dst: Reg, src: Reg) {
        self.rex(true, src.high(), 0, dst.high());
        self.byte(opcode);
        self.modrm(0b11, src.low(), dst.low());
    }

    pub fn mov(&mut self, dst: Reg, src: Reg) {
        self.reg_reg(0x89, dst, src)
    }

    pub fn cmp(&mut self, left: Reg, right: Reg) {
        self.reg_reg(0x39, left, right)
    }

    pub fn test(&mut self, left: Reg, right: Reg) {
        self.reg_reg(0x85, left, right)
    }

    /// Zeroes a register through its 32-bit alias.
    pub fn zero(&mut self, reg: Reg) {
        self.rex(false, reg.high(), 0, reg.high());
        self.byte(0x31);
        self.modrm(0b11, reg.low(), reg.low());
    }

    pub fn inc(&mut self, reg: Reg) {
        self.rex(true, 0, 0, reg.high());
        self.byte(0xFF);
        self.modrm(0b11, 0, reg.low());
    }

    pub fn add_imm(&mut self, reg: Reg, imm: i32) {
        self.alu_imm(0, reg, imm)
    }

    pub fn sub_imm(&mut self, reg: Reg, imm: i32) {
        self.alu_imm(5, reg, imm)
    }

    fn alu_imm(&mut self, ext: u8, reg: Reg, imm: i32) {
        self.rex(true, 0, 0, reg.high());
        match i8::try_from(imm) {
            Ok(imm) => {
                self.byte(0x83);
                self.modrm(0b11, ext, reg.low());
                self.byte(imm as u8);
            }
            Err(_) => {
                self.byte(0x81);
                self.modrm(0b11, ext, reg.low());
                self.imm32(imm as u32);
            }
        }
    }

    /// `imul dst, src, imm32`
    pub fn imul_imm(&mut self, dst: Reg, src: Reg, imm: i32) {
        self.rex(true, dst.high(), 0, src.high());
        self.byte(0x69);
        self.modrm(0b11, dst.low(), src.low());
        self.imm32(imm as u32);
    }

    /// `cmp eax, imm32`
    pub fn cmp_eax_imm(&mut self, imm: u32) {
        self.byte(0x3D);
        self.imm32(imm);
    }

    /// `mov eax, imm32`
    pub fn mov_eax_imm(&mut self, imm: u32) {
        self.byte(0xB8);
        self.imm32(imm);
    }

    /// Loads a 32-bit value, zero extending it into the full register.
    pub fn load32(&mut self, dst: Reg, mem: Mem) {
        self.mem_operand(false, &[0x8B], dst as u8, mem)
    }

    pub fn load(&mut self, dst: Reg, mem: Mem) {
        self.mem_operand(true, &[0x8B], dst as u8, mem)
    }

    pub fn store(&mut self, mem: Mem, src: Reg) {
        self.mem_operand(true, &[0x89], src as u8, mem)
    }

    /// `bts [mem], reg`, setting carry to the bit's previous value.
    pub fn bts(&mut self, mem: Mem, bit: Reg) {
        self.mem_operand(true, &[0x0F, 0xAB], bit as u8, mem)
    }

    /// `lea dst, [rip + label]`
    pub fn lea_label(&mut self, dst: Reg, label: Label) {
        self.rex(true, dst.high(), 0, 0);
        self.byte(0x8D);
        self.modrm(0b00, dst.low(), 0b101);
        self.rel32(label);
    }

    pub fn jmp(&mut self, label: Label) {
        self.byte(0xE9);
        self.rel32(label);
    }

    /// `jmp qword [mem]`
    pub fn jmp_mem(&mut self, mem: Mem) {
        self.mem_operand(false, &[0xFF], 4, mem)
    }

    pub fn jcc(&mut self, cond: Cond, label: Label) {
        self.byte(0x0F);
        self.byte(0x80 | cond as u8);
        self.rel32(label);
    }

    pub fn ret(&mut self) {
        self.byte(0xC3);
    }
}
