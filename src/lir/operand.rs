// This module defines the operand model of the low-level IR. An Operand is a small Copy
// value naming where an instruction input or result lives: nowhere (Illegal), an inline
// Constant, a stack slot, a register (physical CPU, physical CPU pair, physical FPU, or
// virtual), or a memory Address made of a base register, an optional scaled index
// register and a displacement. Every register carries the value type it holds and two
// liveness flags (last use and destroyed). Constructors validate kind/type combinations
// up front, so a float in a CPU register or an address whose base is a constant cannot
// be built; state changes such as marking a last use return a new operand.

//! LIR operands: constants, stack slots, registers and addresses.

use crate::core::error::{CompileError, CompileResult};
use std::fmt;

/// Placeholder displacement for addresses whose real offset is patched in later.
///
/// Never a legal field offset: the resolver refuses real offsets equal to it.
pub const PATCHED_DISPLACEMENT: i32 = i32::MAX;

/// Value types of source-level signatures and memory accesses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BasicType {
    Boolean,
    Char,
    Float,
    Double,
    Byte,
    Short,
    Int,
    Long,
    Object,
    Array,
    Address,
    Metadata,
    Void,
}

impl BasicType {
    /// Number of logical argument slots a value of this type occupies.
    pub fn slot_count(self) -> u32 {
        match self {
            BasicType::Long | BasicType::Double => 2,
            BasicType::Void => 0,
            _ => 1,
        }
    }

    pub fn is_reference(self) -> bool {
        matches!(self, BasicType::Object | BasicType::Array)
    }

    pub fn is_floating(self) -> bool {
        matches!(self, BasicType::Float | BasicType::Double)
    }

    /// Operand type holding a value of this type. Sub-word integers widen to `Int`.
    pub fn opr_type(self) -> Option<OprType> {
        Some(match self {
            BasicType::Boolean
            | BasicType::Char
            | BasicType::Byte
            | BasicType::Short
            | BasicType::Int => OprType::Int,
            BasicType::Long => OprType::Long,
            BasicType::Float => OprType::Float,
            BasicType::Double => OprType::Double,
            BasicType::Object | BasicType::Array => OprType::Object,
            BasicType::Address => OprType::Address,
            BasicType::Metadata => OprType::Metadata,
            BasicType::Void => return None,
        })
    }

    /// In-memory element size in bytes.
    pub fn size_in_bytes(self, word_size: u32, compressed_oops: bool) -> u32 {
        match self {
            BasicType::Boolean | BasicType::Byte => 1,
            BasicType::Char | BasicType::Short => 2,
            BasicType::Int | BasicType::Float => 4,
            BasicType::Long | BasicType::Double => 8,
            BasicType::Object | BasicType::Array => {
                if compressed_oops && word_size == 8 {
                    4
                } else {
                    word_size
                }
            }
            BasicType::Address | BasicType::Metadata => word_size,
            BasicType::Void => 0,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            BasicType::Boolean => "boolean",
            BasicType::Char => "char",
            BasicType::Float => "float",
            BasicType::Double => "double",
            BasicType::Byte => "byte",
            BasicType::Short => "short",
            BasicType::Int => "int",
            BasicType::Long => "long",
            BasicType::Object => "object",
            BasicType::Array => "array",
            BasicType::Address => "address",
            BasicType::Metadata => "metadata",
            BasicType::Void => "void",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "boolean" => BasicType::Boolean,
            "char" => BasicType::Char,
            "float" => BasicType::Float,
            "double" => BasicType::Double,
            "byte" => BasicType::Byte,
            "short" => BasicType::Short,
            "int" => BasicType::Int,
            "long" => BasicType::Long,
            "object" => BasicType::Object,
            "array" => BasicType::Array,
            "address" => BasicType::Address,
            "metadata" => BasicType::Metadata,
            "void" => BasicType::Void,
            _ => return None,
        })
    }
}

/// Type of the value an operand holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OprType {
    Int,
    Long,
    Object,
    Address,
    Float,
    Double,
    Metadata,
}

/// Whether a value occupies one or two machine slots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Width {
    Single,
    Double,
}

impl OprType {
    pub fn width(self) -> Width {
        match self {
            OprType::Long | OprType::Double => Width::Double,
            _ => Width::Single,
        }
    }

    pub fn is_float(self) -> bool {
        matches!(self, OprType::Float | OprType::Double)
    }

    pub fn is_oop(self) -> bool {
        self == OprType::Object
    }

    /// Memory type of a full-width access holding this type.
    pub fn default_mem_type(self) -> BasicType {
        match self {
            OprType::Int => BasicType::Int,
            OprType::Long => BasicType::Long,
            OprType::Object => BasicType::Object,
            OprType::Address => BasicType::Address,
            OprType::Float => BasicType::Float,
            OprType::Double => BasicType::Double,
            OprType::Metadata => BasicType::Metadata,
        }
    }

    fn short_name(self) -> char {
        match self {
            OprType::Int => 'I',
            OprType::Long => 'J',
            OprType::Object => 'L',
            OprType::Address => 'P',
            OprType::Float => 'F',
            OprType::Double => 'D',
            OprType::Metadata => 'M',
        }
    }
}

/// Virtual register number. Numbers below the architecture's physical register count
/// are never handed out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VReg(pub u32);

impl VReg {
    /// Returned once the virtual register space is exhausted.
    pub const POISON: VReg = VReg(u32::MAX);

    pub fn index(self) -> u32 {
        self.0
    }

    pub fn is_poison(self) -> bool {
        self == Self::POISON
    }
}

impl fmt::Display for VReg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_poison() {
            write!(f, "v<poison>")
        } else {
            write!(f, "v{}", self.0)
        }
    }
}

/// Register identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RegId {
    /// Physical CPU register by dense number.
    Cpu(u16),
    /// Two CPU registers holding a double-width value on 32-bit targets.
    CpuPair { lo: u16, hi: u16 },
    /// Physical FPU register by dense number.
    Fpu(u16),
    Virtual(VReg),
}

/// Liveness flags carried by a register operand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct RegFlags(u8);

impl RegFlags {
    pub const NONE: RegFlags = RegFlags(0);
    pub const LAST_USE: RegFlags = RegFlags(1 << 0);
    pub const DESTROYS: RegFlags = RegFlags(1 << 1);

    pub fn contains(self, other: RegFlags) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn with(self, other: RegFlags) -> RegFlags {
        RegFlags(self.0 | other.0)
    }
}

/// A register operand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Register {
    id: RegId,
    ty: OprType,
    flags: RegFlags,
}

impl Register {
    /// A single physical CPU register. Long values are allowed (64-bit targets hold them in
    /// one register); floating-point types are not.
    pub fn cpu(rnr: u16, ty: OprType) -> CompileResult<Self> {
        if ty.is_float() {
            return Err(CompileError::invariant(format!(
                "cpu register R{} cannot hold {:?}",
                rnr, ty
            )));
        }
        Ok(Self { id: RegId::Cpu(rnr), ty, flags: RegFlags::NONE })
    }

    /// A pair of CPU registers holding a long on a 32-bit target.
    pub fn cpu_pair(lo: u16, hi: u16, ty: OprType) -> CompileResult<Self> {
        if ty != OprType::Long || lo == hi {
            return Err(CompileError::invariant(format!(
                "register pair R{}R{} cannot hold {:?}",
                lo, hi, ty
            )));
        }
        Ok(Self { id: RegId::CpuPair { lo, hi }, ty, flags: RegFlags::NONE })
    }

    pub fn fpu(rnr: u16, ty: OprType) -> CompileResult<Self> {
        if !ty.is_float() {
            return Err(CompileError::invariant(format!(
                "fpu register F{} cannot hold {:?}",
                rnr, ty
            )));
        }
        Ok(Self { id: RegId::Fpu(rnr), ty, flags: RegFlags::NONE })
    }

    /// Virtual registers may hold any type.
    pub fn new_virtual(vreg: VReg, ty: OprType) -> Self {
        Self { id: RegId::Virtual(vreg), ty, flags: RegFlags::NONE }
    }

    pub fn id(&self) -> RegId {
        self.id
    }

    pub fn ty(&self) -> OprType {
        self.ty
    }

    pub fn width(&self) -> Width {
        self.ty.width()
    }

    pub fn flags(&self) -> RegFlags {
        self.flags
    }

    pub fn is_virtual(&self) -> bool {
        matches!(self.id, RegId::Virtual(_))
    }

    pub fn vreg(&self) -> Option<VReg> {
        match self.id {
            RegId::Virtual(v) => Some(v),
            _ => None,
        }
    }

    pub fn is_last_use(&self) -> bool {
        self.flags.contains(RegFlags::LAST_USE)
    }

    pub fn is_destroyed(&self) -> bool {
        self.flags.contains(RegFlags::DESTROYS)
    }

    /// Same register with liveness flags cleared.
    pub fn plain(self) -> Self {
        Self { flags: RegFlags::NONE, ..self }
    }

    /// Whether both name the same register regardless of type and flags.
    pub fn same_register(&self, other: &Register) -> bool {
        self.id == other.id
    }

    /// Replace the identity, keeping type and flags. Used by allocators rewriting
    /// virtual registers to physical ones.
    pub fn assign(&mut self, id: RegId) -> CompileResult<()> {
        let checked = match id {
            RegId::Cpu(rnr) => Register::cpu(rnr, self.ty)?,
            RegId::CpuPair { lo, hi } => Register::cpu_pair(lo, hi, self.ty)?,
            RegId::Fpu(rnr) => Register::fpu(rnr, self.ty)?,
            RegId::Virtual(v) => Register::new_virtual(v, self.ty),
        };
        self.id = checked.id;
        Ok(())
    }

    fn usable_as_address_part(&self) -> bool {
        !self.ty.is_float() && !matches!(self.id, RegId::CpuPair { .. } | RegId::Fpu(_))
    }
}

impl fmt::Display for Register {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.id {
            RegId::Cpu(rnr) => write!(f, "R{}", rnr)?,
            RegId::CpuPair { lo, hi } => write!(f, "R{}R{}", lo, hi)?,
            RegId::Fpu(rnr) => write!(f, "F{}", rnr)?,
            RegId::Virtual(v) => write!(f, "{}", v)?,
        }
        write!(f, "|{}", self.ty.short_name())?;
        if self.is_last_use() {
            write!(f, "(last_use)")?;
        }
        if self.is_destroyed() {
            write!(f, "(destroyed)")?;
        }
        Ok(())
    }
}

/// Index scale of an address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scale {
    Times1,
    Times2,
    Times4,
    Times8,
}

impl Scale {
    pub fn from_size(bytes: u32) -> Option<Scale> {
        match bytes {
            1 => Some(Scale::Times1),
            2 => Some(Scale::Times2),
            4 => Some(Scale::Times4),
            8 => Some(Scale::Times8),
            _ => None,
        }
    }

    pub fn factor(self) -> i64 {
        match self {
            Scale::Times1 => 1,
            Scale::Times2 => 2,
            Scale::Times4 => 4,
            Scale::Times8 => 8,
        }
    }
}

/// Memory address: `base + index * scale + disp`.
///
/// `ty` is the register type of the value moved through the address, `mem` the type as
/// laid out in memory, which fixes the access width (a byte field is an `Int` value with
/// a `Byte` memory type).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Address {
    base: Register,
    index: Option<Register>,
    scale: Scale,
    disp: i32,
    ty: OprType,
    mem: BasicType,
}

impl Address {
    /// Build an address from operands. Base and index must be integer-typed registers.
    pub fn new(
        base: Operand,
        index: Operand,
        scale: Scale,
        disp: i32,
        ty: OprType,
    ) -> CompileResult<Self> {
        let base = match base {
            Operand::Register(r) if r.usable_as_address_part() => r,
            other => {
                return Err(CompileError::invariant(format!(
                    "address base must be an integer register, got {}",
                    other
                )))
            }
        };
        let index = match index {
            Operand::Illegal => None,
            Operand::Register(r) if r.usable_as_address_part() => Some(r),
            other => {
                return Err(CompileError::invariant(format!(
                    "address index must be an integer register, got {}",
                    other
                )))
            }
        };
        Ok(Self { base, index, scale, disp, ty, mem: ty.default_mem_type() })
    }

    /// Same address accessing memory as `mem`, which must widen to the address type.
    pub fn with_mem_type(mut self, mem: BasicType) -> CompileResult<Self> {
        if mem.opr_type() != Some(self.ty) {
            return Err(CompileError::invariant(format!(
                "{} memory cannot be accessed as {:?}",
                mem.name(),
                self.ty
            )));
        }
        self.mem = mem;
        Ok(self)
    }

    pub fn base_disp(base: Register, disp: i32, ty: OprType) -> CompileResult<Self> {
        Self::new(Operand::Register(base), Operand::Illegal, Scale::Times1, disp, ty)
    }

    pub fn base(&self) -> Register {
        self.base
    }

    pub fn index(&self) -> Option<Register> {
        self.index
    }

    pub fn scale(&self) -> Scale {
        self.scale
    }

    pub fn disp(&self) -> i32 {
        self.disp
    }

    pub fn ty(&self) -> OprType {
        self.ty
    }

    pub fn mem_type(&self) -> BasicType {
        self.mem
    }

    /// Whether the displacement is the patching placeholder.
    pub fn is_patched(&self) -> bool {
        self.disp == PATCHED_DISPLACEMENT
    }

    pub(crate) fn base_mut(&mut self) -> &mut Register {
        &mut self.base
    }

    pub(crate) fn index_mut(&mut self) -> Option<&mut Register> {
        self.index.as_mut()
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}", self.base)?;
        if let Some(index) = &self.index {
            write!(f, "+{}*{}", index, self.scale.factor())?;
        }
        if self.is_patched() {
            write!(f, "+<patched>")?;
        } else if self.disp != 0 {
            write!(f, "{:+}", self.disp)?;
        }
        if self.mem == self.ty.default_mem_type() {
            write!(f, "|{}]", self.ty.short_name())
        } else {
            write!(f, "|{}:{}]", self.ty.short_name(), self.mem.name())
        }
    }
}

/// Stack slot, numbered in logical argument/spill slots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StackSlot {
    pub index: u32,
    pub ty: OprType,
}

impl StackSlot {
    pub fn width(&self) -> Width {
        self.ty.width()
    }
}

/// Inline constant. Floating-point values are stored as raw bits so equality is
/// structural.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Constant {
    Int(i32),
    Long(i64),
    Float(u32),
    Double(u64),
    /// Object handle; `None` is the null reference.
    Object(Option<u64>),
    Metadata(u64),
    Address(u64),
}

impl Constant {
    pub fn float(value: f32) -> Self {
        Constant::Float(value.to_bits())
    }

    pub fn double(value: f64) -> Self {
        Constant::Double(value.to_bits())
    }

    pub fn ty(&self) -> OprType {
        match self {
            Constant::Int(_) => OprType::Int,
            Constant::Long(_) => OprType::Long,
            Constant::Float(_) => OprType::Float,
            Constant::Double(_) => OprType::Double,
            Constant::Object(_) => OprType::Object,
            Constant::Metadata(_) => OprType::Metadata,
            Constant::Address(_) => OprType::Address,
        }
    }

    /// Integral value usable as an address displacement.
    pub fn as_displacement(&self) -> Option<i64> {
        match *self {
            Constant::Int(v) => Some(v as i64),
            Constant::Long(v) => Some(v),
            _ => None,
        }
    }
}

impl fmt::Display for Constant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Constant::Int(v) => write!(f, "int:{}", v),
            Constant::Long(v) => write!(f, "lng:{}", v),
            Constant::Float(bits) => write!(f, "flt:{}", f32::from_bits(bits)),
            Constant::Double(bits) => write!(f, "dbl:{}", f64::from_bits(bits)),
            Constant::Object(None) => write!(f, "obj:null"),
            Constant::Object(Some(h)) => write!(f, "obj:{:#x}", h),
            Constant::Metadata(h) => write!(f, "md:{:#x}", h),
            Constant::Address(a) => write!(f, "adr:{:#x}", a),
        }
    }
}

/// Instruction operand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Operand {
    #[default]
    Illegal,
    Constant(Constant),
    Stack(StackSlot),
    Register(Register),
    Address(Address),
}

impl Operand {
    pub fn int_const(v: i32) -> Self {
        Operand::Constant(Constant::Int(v))
    }

    pub fn long_const(v: i64) -> Self {
        Operand::Constant(Constant::Long(v))
    }

    pub fn null() -> Self {
        Operand::Constant(Constant::Object(None))
    }

    pub fn stack(index: u32, ty: OprType) -> Self {
        Operand::Stack(StackSlot { index, ty })
    }

    pub fn is_illegal(&self) -> bool {
        matches!(self, Operand::Illegal)
    }

    pub fn is_valid(&self) -> bool {
        !self.is_illegal()
    }

    pub fn is_constant(&self) -> bool {
        matches!(self, Operand::Constant(_))
    }

    pub fn is_register(&self) -> bool {
        matches!(self, Operand::Register(_))
    }

    pub fn is_stack(&self) -> bool {
        matches!(self, Operand::Stack(_))
    }

    pub fn is_address(&self) -> bool {
        matches!(self, Operand::Address(_))
    }

    /// Register operand naming a virtual register.
    pub fn is_virtual(&self) -> bool {
        matches!(self, Operand::Register(r) if r.is_virtual())
    }

    pub fn as_register(&self) -> Option<Register> {
        match self {
            Operand::Register(r) => Some(*r),
            _ => None,
        }
    }

    pub fn as_constant(&self) -> Option<Constant> {
        match self {
            Operand::Constant(c) => Some(*c),
            _ => None,
        }
    }

    pub fn as_address(&self) -> Option<Address> {
        match self {
            Operand::Address(a) => Some(*a),
            _ => None,
        }
    }

    pub fn vreg(&self) -> Option<VReg> {
        self.as_register().and_then(|r| r.vreg())
    }

    pub fn ty(&self) -> Option<OprType> {
        match self {
            Operand::Illegal => None,
            Operand::Constant(c) => Some(c.ty()),
            Operand::Stack(s) => Some(s.ty),
            Operand::Register(r) => Some(r.ty),
            Operand::Address(a) => Some(a.ty),
        }
    }

    /// Copy of this register operand flagged as its last use. Other kinds are returned
    /// unchanged.
    pub fn make_last_use(self) -> Self {
        match self {
            Operand::Register(r) => Operand::Register(Register { flags: r.flags.with(RegFlags::LAST_USE), ..r }),
            other => other,
        }
    }

    /// Copy of this register operand flagged as destroyed by its instruction.
    pub fn make_destroys(self) -> Self {
        match self {
            Operand::Register(r) => Operand::Register(Register { flags: r.flags.with(RegFlags::DESTROYS), ..r }),
            other => other,
        }
    }
}

impl From<Register> for Operand {
    fn from(r: Register) -> Self {
        Operand::Register(r)
    }
}

impl From<Address> for Operand {
    fn from(a: Address) -> Self {
        Operand::Address(a)
    }
}

impl From<Constant> for Operand {
    fn from(c: Constant) -> Self {
        Operand::Constant(c)
    }
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand::Illegal => write!(f, "-"),
            Operand::Constant(c) => write!(f, "{}", c),
            Operand::Stack(s) => write!(f, "S{}|{}", s.index, s.ty.short_name()),
            Operand::Register(r) => write!(f, "{}", r),
            Operand::Address(a) => write!(f, "{}", a),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constructors_reject_mismatched_kinds() {
        assert!(Register::cpu(0, OprType::Float).is_err());
        assert!(Register::fpu(0, OprType::Int).is_err());
        assert!(Register::cpu_pair(1, 2, OprType::Int).is_err());
        assert!(Register::cpu_pair(1, 1, OprType::Long).is_err());
        assert!(Register::cpu(0, OprType::Long).is_ok());
        assert!(Register::cpu_pair(1, 2, OprType::Long).is_ok());
    }

    #[test]
    fn test_address_parts_must_be_integer_registers() {
        let base = Register::new_virtual(VReg(40), OprType::Object);
        let float = Register::new_virtual(VReg(41), OprType::Double);

        assert!(Address::new(Operand::int_const(0), Operand::Illegal, Scale::Times1, 0, OprType::Int).is_err());
        assert!(Address::new(base.into(), Operand::int_const(3), Scale::Times4, 0, OprType::Int).is_err());
        assert!(Address::new(float.into(), Operand::Illegal, Scale::Times1, 0, OprType::Int).is_err());

        let addr = Address::new(base.into(), Operand::Illegal, Scale::Times1, 16, OprType::Int).unwrap();
        assert_eq!(addr.base(), base);
        assert_eq!(addr.disp(), 16);
        assert!(!addr.is_patched());
    }

    #[test]
    fn test_width_follows_type() {
        assert_eq!(Register::cpu(0, OprType::Long).unwrap().width(), Width::Double);
        assert_eq!(Register::fpu(0, OprType::Float).unwrap().width(), Width::Single);
        assert_eq!(StackSlot { index: 0, ty: OprType::Double }.width(), Width::Double);
        assert_eq!(BasicType::Long.slot_count(), 2);
        assert_eq!(BasicType::Void.slot_count(), 0);
        assert_eq!(BasicType::Short.opr_type(), Some(OprType::Int));
    }

    #[test]
    fn test_last_use_is_a_new_value() {
        let reg = Operand::Register(Register::new_virtual(VReg(50), OprType::Int));
        let last = reg.make_last_use();
        assert_ne!(reg, last);
        assert!(last.as_register().unwrap().is_last_use());
        assert!(!reg.as_register().unwrap().is_last_use());
        assert!(last.as_register().unwrap().same_register(&reg.as_register().unwrap()));
        assert_eq!(Operand::int_const(3).make_last_use(), Operand::int_const(3));
    }

    #[test]
    fn test_structural_equality() {
        assert_eq!(Operand::Constant(Constant::double(1.5)), Operand::Constant(Constant::double(1.5)));
        assert_ne!(Operand::int_const(1), Operand::long_const(1));
        assert_eq!(Operand::stack(3, OprType::Int), Operand::stack(3, OprType::Int));
    }

    #[test]
    fn test_display() {
        let base = Register::new_virtual(VReg(40), OprType::Object);
        let index = Register::new_virtual(VReg(41), OprType::Int);
        let addr = Address::new(base.into(), index.into(), Scale::Times4, 16, OprType::Int).unwrap();
        assert_eq!(Operand::from(addr).to_string(), "[v40|L+v41|I*4+16|I]");
        assert_eq!(Operand::Register(Register::cpu(3, OprType::Int).unwrap()).to_string(), "R3|I");
        assert_eq!(Operand::null().to_string(), "obj:null");
    }

    #[test]
    fn test_memory_type_sets_access_width() {
        let base = Register::new_virtual(VReg(40), OprType::Object);
        let int = Address::base_disp(base, 12, OprType::Int).unwrap();
        assert_eq!(int.mem_type(), BasicType::Int);

        let byte = int.with_mem_type(BasicType::Byte).unwrap();
        let short = int.with_mem_type(BasicType::Short).unwrap();
        assert_ne!(byte, int);
        assert_ne!(byte, short);
        assert_eq!(Operand::from(byte).to_string(), "[v40|L+12|I:byte]");

        assert!(int.with_mem_type(BasicType::Long).is_err());
        assert!(int.with_mem_type(BasicType::Void).is_err());
    }
}
