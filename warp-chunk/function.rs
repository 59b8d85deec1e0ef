//! The code side of the chunk hierarchy: `FunctionList -> Function -> Block -> Instruction`.

use crate::{
   index::{
      BlockId,
      FunctionId,
      FunctionListId,
      InstructionId,
      ModuleId,
   },
   position::{
      Cache,
      Generation,
      Position,
      Positioned,
   },
   program::Program,
   semantic::Semantic,
};

/// One loaded module's functions, ordered by address.
#[derive(Debug)]
pub struct FunctionList {
   pub(crate) parent: ModuleId,
   pub(crate) children: Vec<FunctionId>,
   pub(crate) generation: Generation,
   position: Position,
   cache: Cache,
}

impl FunctionList {
   pub(crate) fn new(parent: ModuleId) -> Self {
      Self {
         parent,
         children: Vec::new(),
         generation: Generation::default(),
         position: Position::RelativeToParent(0),
         cache: Cache::default(),
      }
   }

   /// Functions in address order, for `ChunkFind2`'s binary search over the module.
   #[must_use]
   pub fn functions(&self) -> &[FunctionId] {
      &self.children
   }
}

impl Positioned for FunctionList {
   fn raw_position(&self) -> Position {
      self.position
   }

   fn cache(&self) -> &Cache {
      &self.cache
   }
}

/// A symbolic name, address and body: an ordered sequence of basic blocks.
#[derive(Debug)]
pub struct Function {
   pub(crate) parent: FunctionListId,
   pub(crate) children: Vec<BlockId>,
   pub(crate) generation: Generation,
   position: Position,
   cache: Cache,
   pub name: String,
}

impl Function {
   pub(crate) fn new(parent: FunctionListId, name: String, position: Position) -> Self {
      Self {
         parent,
         children: Vec::new(),
         generation: Generation::default(),
         position,
         cache: Cache::default(),
         name,
      }
   }

   #[must_use]
   pub fn blocks(&self) -> &[BlockId] {
      &self.children
   }
}

impl Positioned for Function {
   fn raw_position(&self) -> Position {
      self.position
   }

   fn cache(&self) -> &Cache {
      &self.cache
   }
}

/// A basic block: single-entry, single-exit under normal control flow.
#[derive(Debug)]
pub struct Block {
   pub(crate) parent: FunctionId,
   pub(crate) children: Vec<InstructionId>,
   pub(crate) generation: Generation,
   position: Position,
   cache: Cache,
}

impl Block {
   pub(crate) fn new(parent: FunctionId, position: Position) -> Self {
      Self {
         parent,
         children: Vec::new(),
         generation: Generation::default(),
         position,
         cache: Cache::default(),
      }
   }

   #[must_use]
   pub fn instructions(&self) -> &[InstructionId] {
      &self.children
   }
}

impl Positioned for Block {
   fn raw_position(&self) -> Position {
      self.position
   }

   fn cache(&self) -> &Cache {
      &self.cache
   }
}

/// A leaf chunk owning exactly one [`Semantic`].
#[derive(Debug)]
pub struct Instruction {
   pub(crate) parent: BlockId,
   position: Position,
   cache: Cache,
   pub semantic: Semantic,
}

impl Instruction {
   pub(crate) fn new(parent: BlockId, position: Position, semantic: Semantic) -> Self {
      Self {
         parent,
         position,
         cache: Cache::default(),
         semantic,
      }
   }
}

impl Positioned for Instruction {
   fn raw_position(&self) -> Position {
      self.position
   }

   fn cache(&self) -> &Cache {
      &self.cache
   }
}

impl Program {
   #[must_use]
   pub fn function_exists(&self, id: FunctionId) -> bool {
      self.functions.contains_key(id)
   }

   #[must_use]
   pub fn block_exists(&self, id: BlockId) -> bool {
      self.blocks.contains_key(id)
   }

   #[must_use]
   pub fn instruction_exists(&self, id: InstructionId) -> bool {
      self.instructions.contains_key(id)
   }

   #[must_use]
   pub fn function_list(&self, id: FunctionListId) -> &FunctionList {
      &self.function_lists[id]
   }

   #[must_use]
   pub fn function_list_address(&self, id: FunctionListId) -> u64 {
      let list = &self.function_lists[id];
      crate::position::resolve_address(
         list,
         self.modules[list.parent].generation().get(),
         || self.module_address(list.parent),
         || self.module_address(list.parent),
      )
   }

   #[must_use]
   pub fn function(&self, id: FunctionId) -> &Function {
      &self.functions[id]
   }

   #[must_use]
   pub fn function_address(&self, id: FunctionId) -> u64 {
      let function = &self.functions[id];
      let list = &self.function_lists[function.parent];

      crate::position::resolve_address(
         function,
         list.generation.get(),
         || self.function_list_address(function.parent),
         || match list.children.iter().position(|&candidate| candidate == id) {
            Some(0) | None => self.function_list_address(function.parent),
            Some(index) => {
               let previous = list.children[index - 1];
               self.function_address(previous) + self.function_size(previous)
            },
         },
      )
   }

   #[must_use]
   pub fn function_size(&self, id: FunctionId) -> u64 {
      self.functions[id]
         .children
         .iter()
         .map(|&block| self.block_size(block))
         .sum()
   }

   /// Inserts `function` into its list in address order, bumping the list's generation so later
   /// siblings recompute their cached addresses.
   pub fn insert_function(&mut self, list_id: FunctionListId, name: String, position: Position) -> FunctionId {
      let function = Function::new(list_id, name, position);
      let id = self.functions.insert(function);

      let target = position_hint(position);
      let children = self.function_lists[list_id].children.clone();
      let insert_at = children
         .iter()
         .position(|&existing| self.function_address(existing) > target)
         .unwrap_or(children.len());

      let list = &mut self.function_lists[list_id];
      list.children.insert(insert_at, id);
      list.generation.bump();

      id
   }

   #[must_use]
   pub fn block(&self, id: BlockId) -> &Block {
      &self.blocks[id]
   }

   /// The function a block belongs to. Lets a pass that only holds a `BlockId` (as every
   /// `visit_block` override does) reach the function's other blocks, e.g. to extend a
   /// prologue/epilogue pair.
   #[must_use]
   pub fn block_function(&self, id: BlockId) -> FunctionId {
      self.blocks[id].parent
   }

   /// The block an instruction belongs to. Lets a pass that only holds an `InstructionId` (as
   /// every `visit_instruction` override does) insert a sibling next to it.
   #[must_use]
   pub fn instruction_block(&self, id: InstructionId) -> BlockId {
      self.instructions[id].parent
   }

   #[must_use]
   pub fn block_address(&self, id: BlockId) -> u64 {
      let block = &self.blocks[id];
      let function = &self.functions[block.parent];

      crate::position::resolve_address(
         block,
         function.generation.get(),
         || self.function_address(block.parent),
         || match function.children.iter().position(|&candidate| candidate == id) {
            Some(0) | None => self.function_address(block.parent),
            Some(index) => {
               let previous = function.children[index - 1];
               self.block_address(previous) + self.block_size(previous)
            },
         },
      )
   }

   #[must_use]
   pub fn block_size(&self, id: BlockId) -> u64 {
      self.blocks[id]
         .children
         .iter()
         .map(|&instruction| self.instruction_size(instruction))
         .sum()
   }

   /// Appends a new block at the end of `function`'s body.
   pub fn push_block(&mut self, function_id: FunctionId) -> BlockId {
      let block = Block::new(function_id, Position::AfterPreviousSibling);
      let id = self.blocks.insert(block);

      let function = &mut self.functions[function_id];
      function.children.push(id);
      function.generation.bump();

      id
   }

   #[must_use]
   pub fn instruction(&self, id: InstructionId) -> &Instruction {
      &self.instructions[id]
   }

   #[must_use]
   pub fn instruction_mut(&mut self, id: InstructionId) -> &mut Instruction {
      &mut self.instructions[id]
   }

   #[must_use]
   pub fn instruction_address(&self, id: InstructionId) -> u64 {
      let instruction = &self.instructions[id];
      let block = &self.blocks[instruction.parent];

      crate::position::resolve_address(
         instruction,
         block.generation.get(),
         || self.block_address(instruction.parent),
         || match block.children.iter().position(|&candidate| candidate == id) {
            Some(0) | None => self.block_address(instruction.parent),
            Some(index) => {
               let previous = block.children[index - 1];
               self.instruction_address(previous) + self.instruction_size(previous)
            },
         },
      )
   }

   #[must_use]
   pub fn instruction_size(&self, id: InstructionId) -> u64 {
      self.instructions[id].semantic.size()
   }

   /// Inserts `instruction` into `block` at `index`, bumping the block's generation so every
   /// later instruction (and any address cache depending on them) recomputes lazily.
   pub fn insert_instruction(&mut self, block_id: BlockId, index: usize, semantic: Semantic) -> InstructionId {
      let instruction = Instruction::new(block_id, Position::AfterPreviousSibling, semantic);
      let id = self.instructions.insert(instruction);

      let block = &mut self.blocks[block_id];
      block.children.insert(index.min(block.children.len()), id);
      block.generation.bump();

      id
   }

   /// Marks `block` as structurally changed without inserting anything, for passes that mutate
   /// an instruction's `Semantic` size in place (e.g. widening) rather than inserting/removing.
   pub fn touch_block(&mut self, block_id: BlockId) {
      self.blocks[block_id].generation.bump();
   }

   /// Pins `function` to an absolute address, bumping its generation so every block and
   /// instruction beneath it recomputes on next read. Used by `warp-layout`'s address
   /// assignment fixpoint.
   pub fn set_function_address(&mut self, id: FunctionId, address: u64) {
      let function = &mut self.functions[id];
      function.position = Position::Absolute(address);
      function.cache.invalidate();
      function.generation.bump();
   }
}

/// `insert_function` compares candidate addresses against the *requested* absolute position of
/// the function being inserted; non-absolute requests sort last (appended), since there is no
/// address to compare against yet.
fn position_hint(position: Position) -> u64 {
   match position {
      Position::Absolute(address) => address,
      Position::RelativeToParent(_) | Position::AfterPreviousSibling => u64::MAX,
   }
}
